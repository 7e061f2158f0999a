//! Debugger link (C8): a locally maintained list mirroring the host
//! loader's rendezvous structure, so a debugger attached to the host
//! process can see guest modules too ("Process-wide debugger
//! anchor").
//!
//! The on-wire layout of [`RDebug`]/[`LinkMap`] must match the host
//! loader's exactly ("Debugger rendezvous layout") — these are not
//! `bionic_loader`'s own invention, they are read by an external debugger
//! walking raw memory.
use std::ffi::{CString, c_char};
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};

/// `r_debug.r_state` values, matching every ELF dynamic loader's ABI.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum RState {
 Consistent = 0,
 Add = 1,
 Delete = 2,
}

/// The rendezvous structure reachable from `DT_DEBUG` in the main
/// executable, or from a well-known symbol exported by the host runtime.
#[repr(C)]
pub struct RDebug {
 pub(crate) version: i32,
 pub(crate) map: *mut LinkMap,
 pub(crate) brk: extern "C" fn(),
 pub(crate) state: i32,
 pub(crate) ldbase: usize,
}

/// One node of the rendezvous list. A guest module's node is heap-allocated
/// and leaked for the module's lifetime (freed explicitly on unload,
/// mirroring the module record's own pool-allocated lifetime), since the
/// host loader's list holds a raw, non-owning pointer to it while spliced
/// in.
#[repr(C)]
pub(crate) struct LinkMap {
 pub(crate) addr: usize,
 pub(crate) name: *const c_char,
 pub(crate) ld: usize,
 pub(crate) next: *mut LinkMap,
 pub(crate) prev: *mut LinkMap,
}

extern "C" fn noop_brk() {}

#[cold]
fn synthetic_anchor() -> *mut RDebug {
 // An embedder that never wires a real host anchor (e.g. an isolated
 // test context) still needs somewhere for state transitions to land;
 // allocate a process-local synthetic one. A real `DT_DEBUG`/host-symbol
 // anchor found at startup is used instead whenever one is available
 // (see `Context::with_debug_anchor`).
 Box::into_raw(Box::new(RDebug {
 version: 1,
 map: ptr::null_mut(),
 brk: noop_brk,
 state: RState::Consistent as i32,
 ldbase: 0,
 }))
}

/// One guest module's node plus the name string it points at, owned
/// together so both are freed on unlink.
struct Node {
 map: Box<LinkMap>,
 _name: CString,
}

/// Guards all mutation of the guest-visible list ("a separate mutex
/// serializes debugger-link mutations").
pub(crate) struct DebugLink {
 anchor: *mut RDebug,
 owns_anchor: bool,
 /// Insertion order, matching "Module-registry insertion order equals
 /// debugger-link tail-append order".
 nodes: Vec<(crate::module::ModuleId, Node)>,
 transition_count: AtomicI32,
}

unsafe impl Send for DebugLink {}

impl DebugLink {
 /// Uses a previously discovered host anchor, if any; otherwise
 /// allocates a synthetic one so transitions still have somewhere to
 /// land (useful for isolated test contexts, per
 /// "Global linker state").
 pub(crate) fn new(anchor: Option<*mut RDebug>) -> Self {
 match anchor {
 Some(ptr) => DebugLink { anchor: ptr, owns_anchor: false, nodes: Vec::new(), transition_count: AtomicI32::new(0) },
 None => DebugLink { anchor: synthetic_anchor(), owns_anchor: true, nodes: Vec::new(), transition_count: AtomicI32::new(0) },
 }
 }

 #[cfg(test)]
 pub(crate) fn transitions_seen(&self) -> i32 {
 self.transition_count.load(Ordering::Relaxed)
 }

 fn set_state_and_notify(&self, state: RState) {
 unsafe {
 (*self.anchor).state = state as i32;
 let brk = (*self.anchor).brk;
 brk();
 }
 self.transition_count.fetch_add(1, Ordering::Relaxed);
 }

 /// On load: ADD -> append -> CONSISTENT, each transition notified via
 /// the anchor's callback, so an attached debugger re-reads the list
 /// exactly once per transition.
 pub(crate) fn notify_add(&mut self, id: crate::module::ModuleId, name: &str, base: usize) {
 self.set_state_and_notify(RState::Add);

 let cname = CString::new(name).unwrap_or_default();
 let mut map = Box::new(LinkMap {
 addr: base,
 name: cname.as_ptr(),
 ld: 0,
 next: ptr::null_mut(),
 prev: ptr::null_mut(),
 });

 // Splice onto the tail of the guest list (which mirrors, but is
 // distinct from, the host loader's own list — see `publish`).
 if let Some((_, last)) = self.nodes.last_mut() {
 last.map.next = map.as_mut() as *mut LinkMap;
 map.prev = last.map.as_mut() as *mut LinkMap;
 }
 self.nodes.push((id, Node { map, _name: cname }));

 self.set_state_and_notify(RState::Consistent);
 }

 /// On unload: symmetric DELETE -> unlink -> CONSISTENT.
 pub(crate) fn notify_remove(&mut self, id: crate::module::ModuleId) {
 self.set_state_and_notify(RState::Delete);

 if let Some(pos) = self.nodes.iter().position(|(existing, _)| *existing == id) {
 let (_, node) = self.nodes.remove(pos);
 unsafe {
 if !node.map.prev.is_null() {
 (*node.map.prev).next = node.map.next;
 }
 if !node.map.next.is_null() {
 (*node.map.next).prev = node.map.prev;
 }
 }
 }

 self.set_state_and_notify(RState::Consistent);
 }

 /// Temporarily splices the head of the guest list onto the tail of the
 /// host list so an external debugger walking from its own anchor sees
 /// guest modules too, then un-splices — never leaving the host
 /// loader's own list permanently mutated.
 pub(crate) fn publish<F: FnOnce()>(&mut self, host_tail: *mut LinkMap, during: F) {
 if self.nodes.is_empty() || host_tail.is_null() {
 during();
 return;
 }
 let guest_head = self.nodes.first_mut().unwrap().1.map.as_mut() as *mut LinkMap;
 unsafe {
 let saved_next = (*host_tail).next;
 (*host_tail).next = guest_head;
 (*guest_head).prev = host_tail;

 during();

 (*host_tail).next = saved_next;
 (*guest_head).prev = ptr::null_mut();
 }
 }

 pub(crate) fn order(&self) -> Vec<crate::module::ModuleId> {
 self.nodes.iter().map(|(id, _)| *id).collect()
 }
}

impl Drop for DebugLink {
 fn drop(&mut self) {
 if self.owns_anchor {
 unsafe {
 drop(Box::from_raw(self.anchor));
 }
 }
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use crate::module::ModuleId;

 fn id(slot: usize) -> ModuleId {
 // ModuleId fields are private to `module`, but `module`'s own tests
 // construct ids through `Pool::alloc`; here we only need distinct
 // values to exercise ordering, so route through the pool.
 let mut pool = crate::module::Pool::new(4);
 for _ in 0..slot {
 let _ = pool.alloc(crate::module::tests_support::stub("x"));
 }
 pool.alloc(crate::module::tests_support::stub("y")).unwrap()
 }

 #[test]
 fn insertion_order_matches_tail_append_order() {
 let mut link = DebugLink::new(None);
 let a = id(0);
 let b = id(1);
 link.notify_add(a, "a.so", 0x1000);
 link.notify_add(b, "b.so", 0x2000);
 assert_eq!(link.order(), vec![a, b]);
 }

 #[test]
 fn add_and_remove_each_produce_two_transitions() {
 let mut link = DebugLink::new(None);
 let a = id(0);
 link.notify_add(a, "a.so", 0x1000);
 assert_eq!(link.transitions_seen(), 2);
 link.notify_remove(a);
 assert_eq!(link.transitions_seen(), 4);
 assert!(link.order().is_empty());
 }
}
