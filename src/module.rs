//! Module registry (C6) and the module record data model.
//!
//! Records are allocated from a fixed-size pool and returned to a free list
//! on last close, matching the upstream loader's preference for
//! preallocated, reusable storage. `DT_NEEDED` resolution does **not**
//! overwrite the guest's dynamic-section payload (the redesign flag adopted
//! in DESIGN.md): each record instead carries a side table, `needed`,
//! indexed in parallel with `ElfDynamic::needed_libs`.
use crate::arch::Phdr;
use crate::dynamic::ElfDynamic;
use crate::error::{Result, cannot_load};
use crate::segment::{ElfSegments, Relro, WriteProtectWindow};
use crate::symbol::SymbolTable;
use bitflags::bitflags;
use std::ffi::CString;
use std::path::PathBuf;

bitflags! {
 #[derive(Clone, Copy, Debug, PartialEq, Eq)]
 pub(crate) struct ModuleFlags: u32 {
 const LINKED = 1 << 0;
 const ERROR = 1 << 1;
 const EXE = 1 << 2;
 const LINKER = 1 << 3;
 const GNU_HASH = 1 << 4;
 }
}

/// A stable index into the module pool. Reused slots get a new generation
/// so a stale `ModuleId` from before a close can't silently alias a
/// different, later module (`open(L); close(L); open(M)` must not make a
/// handle to `L` resolve to `M`).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct ModuleId {
 slot: usize,
 generation: u32,
}

/// One loaded guest object ("Module record"). `phdrs` borrows from the
/// mapped image and is valid exactly as long as `segments` is.
pub(crate) struct Module {
 pub(crate) name: CString,
 pub(crate) path: PathBuf,
 pub(crate) segments: ElfSegments,
 pub(crate) phdrs: &'static [Phdr],
 pub(crate) entry: usize,
 pub(crate) dynamic: ElfDynamic,
 pub(crate) symtab: SymbolTable,
 pub(crate) relro: Option<Relro>,
 pub(crate) write_protect: WriteProtectWindow,
 pub(crate) flags: ModuleFlags,
 pub(crate) refcount: u32,
 pub(crate) ctors_called: bool,
 /// Side table: `needed[i]` resolves `dynamic.needed_libs[i]`. `None`
 /// until linked; after linking, `None` only for a tolerated missing
 /// `DT_NEEDED` bound to the libdl stub (see `Context::tolerate_missing_needed`).
 pub(crate) needed: Vec<Option<ModuleId>>,
}

impl Module {
 #[inline]
 pub(crate) fn base(&self) -> usize {
 self.segments.base()
 }

 #[inline]
 pub(crate) fn short_name(&self) -> &str {
 self.name.to_str().unwrap_or("<invalid-utf8>")
 }

 pub(crate) fn is_linked(&self) -> bool {
 self.flags.contains(ModuleFlags::LINKED)
 }

 pub(crate) fn is_error(&self) -> bool {
 self.flags.contains(ModuleFlags::ERROR)
 }
}

struct Slot {
 module: Option<Module>,
 generation: u32,
}

/// Fixed-capacity storage for module records plus a free list, matching
/// "allocated from a fixed pool on load, freed and returned to a local
/// free list on last close".
pub(crate) struct Pool {
 slots: Vec<Slot>,
 free: Vec<usize>,
 capacity: usize,
}

impl Pool {
 pub(crate) fn new(capacity: usize) -> Self {
 Pool { slots: Vec::new(), free: Vec::new(), capacity }
 }

 pub(crate) fn alloc(&mut self, module: Module) -> Result<ModuleId> {
 if let Some(slot) = self.free.pop() {
 let generation = self.slots[slot].generation.wrapping_add(1);
 self.slots[slot] = Slot { module: Some(module), generation };
 return Ok(ModuleId { slot, generation });
 }
 if self.slots.len() >= self.capacity {
 return Err(cannot_load("module pool exhausted"));
 }
 let slot = self.slots.len();
 self.slots.push(Slot { module: Some(module), generation: 0 });
 Ok(ModuleId { slot, generation: 0 })
 }

 pub(crate) fn free(&mut self, id: ModuleId) -> Option<Module> {
 let entry = self.slots.get_mut(id.slot)?;
 if entry.generation != id.generation {
 return None;
 }
 let module = entry.module.take();
 if module.is_some() {
 self.free.push(id.slot);
 }
 module
 }

 pub(crate) fn get(&self, id: ModuleId) -> Option<&Module> {
 let entry = self.slots.get(id.slot)?;
 if entry.generation != id.generation {
 return None;
 }
 entry.module.as_ref()
 }

 pub(crate) fn get_mut(&mut self, id: ModuleId) -> Option<&mut Module> {
 let entry = self.slots.get_mut(id.slot)?;
 if entry.generation != id.generation {
 return None;
 }
 entry.module.as_mut()
 }
}

/// Default pool capacity; the upstream loader's was similarly small and
/// fixed (embedders running larger guest dependency graphs should raise
/// this via `LoaderConfig`).
pub(crate) const DEFAULT_POOL_CAPACITY: usize = 128;

/// The named list of loaded modules, in insertion order. Insertion
/// order is load-bearing: it must equal the debugger-link tail-append order
/// ("Module-registry insertion order equals debugger-link tail-append
/// order").
#[derive(Default)]
pub(crate) struct Registry {
 order: Vec<ModuleId>,
 by_name: hashbrown::HashMap<String, ModuleId>,
}

impl Registry {
 pub(crate) fn insert(&mut self, name: String, id: ModuleId) {
 self.order.push(id);
 self.by_name.insert(name, id);
 }

 pub(crate) fn remove(&mut self, name: &str) {
 if let Some(id) = self.by_name.remove(name) {
 self.order.retain(|existing| *existing != id);
 }
 }

 pub(crate) fn by_name(&self, name: &str) -> Option<ModuleId> {
 self.by_name.get(name).copied()
 }

 pub(crate) fn iter_order(&self) -> impl Iterator<Item = ModuleId> + '_ {
 self.order.iter().copied()
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn pool_reuses_free_slots_with_new_generation() {
 let mut pool = Pool::new(4);
 let id1 = pool.alloc(make_stub_module("a")).unwrap();
 assert!(pool.get(id1).is_some());
 let freed = pool.free(id1);
 assert!(freed.is_some());
 assert!(pool.get(id1).is_none(), "stale id must not resolve after free");

 let id2 = pool.alloc(make_stub_module("b")).unwrap();
 assert_eq!(id2.slot, id1.slot);
 assert_ne!(id2.generation, id1.generation);
 assert!(pool.get(id2).is_some());
 }

 #[test]
 fn pool_respects_capacity() {
 let mut pool = Pool::new(1);
 let _id = pool.alloc(make_stub_module("a")).unwrap();
 assert!(pool.alloc(make_stub_module("b")).is_err());
 }

 fn make_stub_module(name: &str) -> Module {
 tests_support::stub(name)
 }
}

/// Minimal `Module` construction shared by this module's own pool tests and
/// by other modules' tests that only need a distinct, well-formed module
/// record to exercise bookkeeping (registry ordering, refcounting) without
/// a real mapped image.
#[cfg(test)]
pub(crate) mod tests_support {
 use super::*;

 pub(crate) fn stub(name: &str) -> Module {
 Module {
 name: CString::new(name).unwrap(),
 path: PathBuf::from(name),
 segments: unsafe { ElfSegments::empty() },
 phdrs: &[],
 entry: 0,
 dynamic: ElfDynamic::empty_for_test(),
 symtab: SymbolTable::from_dynamic(&ElfDynamic::empty_for_test()),
 relro: None,
 write_protect: WriteProtectWindow::default(),
 flags: ModuleFlags::empty(),
 refcount: 0,
 ctors_called: false,
 needed: Vec::new(),
 }
 }
}
