//! Guest-opaque wrappers (C11): each guest opaque type (mutex, cond,
//! rwlock, semaphore, cleanup frame) treats its guest-visible storage as a
//! single pointer-width overlay over host-native storage allocated on
//! demand ("Translation-shim storage").
//!
//! Grounded on `original_source/pthread_wrapper/libpthread.c`'s
//! `bionic_*_t` unions (`{ bionic: [..]; glibc: T* }`) and its
//! `IS_MAPPED`/`INIT_IF_NOT_MAPPED` pattern: the guest struct's first word
//! is read as a host pointer, and `mincore` tells us whether that pointer
//! is currently backed by a real mapping.
pub(crate) mod cleanup;
pub(crate) mod cond;
pub(crate) mod mutex;
pub(crate) mod rwlock;
pub(crate) mod sem;

use crate::mmap::is_resident;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A guest opaque handle's visible storage: exactly one pointer-width slot,
/// matching the guest struct's first member in every wrapper family here
/// (`original_source`'s `union { <bionic fields>; T *glibc; }`).
#[repr(transparent)]
pub(crate) struct Overlay(AtomicUsize);

impl Overlay {
 /// # Safety
 /// `ptr` must point at (at least) one word of guest-owned storage for
 /// the lifetime of every wrapper call made against it.
 #[inline]
 pub(crate) unsafe fn from_raw(ptr: *mut std::ffi::c_void) -> &'static Overlay {
 unsafe { &*(ptr as *const Overlay) }
 }

 /// Is this overlay initialized? A residency probe. An unmapped address
 /// signals uninitialized (including every guest static-initializer bit
 /// pattern, which are small integers that are never valid page
 /// addresses); a mapped address signals a previously-allocated host
 /// instance.
 ///
 /// This keeps the guest-visible contract intact — a guest statically
 /// initialized by a `= PTHREAD_MUTEX_INITIALIZER`-style pattern must
 /// still be detected on first use.
 pub(crate) fn is_resident(&self) -> bool {
 let raw = self.0.load(Ordering::Acquire);
 raw != 0 && is_resident(raw)
 }

 pub(crate) fn get(&self) -> usize {
 self.0.load(Ordering::Acquire)
 }

 pub(crate) fn set(&self, host_ptr: usize) {
 self.0.store(host_ptr, Ordering::Release);
 }

 pub(crate) fn raw_bits(&self) -> usize {
 self.0.load(Ordering::Relaxed)
 }
}

/// Leaks a `T` onto the heap and returns its address, matching the
/// original's `mmap(... PROT_READ|PROT_WRITE...)` per-handle allocation:
/// one dedicated page-ish block per guest handle, freed explicitly by the
/// paired `destroy` wrapper rather than by Rust's ownership (the guest
/// holds the only logical handle to it).
pub(crate) fn alloc_host<T>(value: T) -> *mut T {
 Box::into_raw(Box::new(value))
}

/// # Safety
/// `ptr` must have been produced by [`alloc_host`] and not already freed.
pub(crate) unsafe fn free_host<T>(ptr: *mut T) {
 if !ptr.is_null() {
 unsafe { drop(Box::from_raw(ptr)) };
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn overlay_small_integer_bit_patterns_are_not_resident() {
 // Guest static-initializer patterns (0, 0x4000, 0x8000,...) must
 // never be mistaken for a mapped host pointer.
 let slot = AtomicUsize::new(0x4000);
 let overlay = Overlay(slot);
 assert!(!overlay.is_resident());
 }

 #[test]
 fn overlay_zero_is_not_resident() {
 let overlay = Overlay(AtomicUsize::new(0));
 assert!(!overlay.is_resident());
 }

 #[test]
 fn overlay_heap_pointer_is_resident() {
 let leaked = alloc_host(42u32);
 let overlay = Overlay(AtomicUsize::new(leaked as usize));
 assert!(overlay.is_resident());
 unsafe { free_host(leaked) };
 }
}
