//! Guest `pthread_mutex_t` wrapper.
//!
//! Grounded on `original_source/pthread_wrapper/libpthread.c`'s
//! `bionic_mutex_init_map`: bionic encodes the mutex kind in bits 14-15 of
//! the first storage word (`(kind & 3) << 14`) for its three static
//! initializers (`PTHREAD_MUTEX_INITIALIZER` = 0, `..._RECURSIVE_NP`,
//! `..._ERRORCHECK_NP`); everything else is a previously-allocated host
//! pointer (or garbage, treated as the normal kind).
use super::{Overlay, alloc_host, free_host};
use std::ffi::c_void;
use std::mem::MaybeUninit;

const KIND_SHIFT: u32 = 14;
const KIND_MASK: usize = 3;

#[derive(Clone, Copy)]
enum Kind {
 Normal,
 Recursive,
 ErrorCheck,
}

fn kind_for_bit_pattern(bits: usize) -> Kind {
 match (bits >> KIND_SHIFT) & KIND_MASK {
 1 => Kind::Recursive,
 2 => Kind::ErrorCheck,
 _ => Kind::Normal,
 }
}

fn libc_kind(kind: Kind) -> libc::c_int {
 match kind {
 Kind::Normal => libc::PTHREAD_MUTEX_NORMAL,
 Kind::Recursive => libc::PTHREAD_MUTEX_RECURSIVE,
 Kind::ErrorCheck => libc::PTHREAD_MUTEX_ERRORCHECK,
 }
}

unsafe fn init_host(kind: Kind, guest_attr: *const libc::pthread_mutexattr_t) -> *mut libc::pthread_mutex_t {
 unsafe {
 let mut native = MaybeUninit::<libc::pthread_mutex_t>::zeroed();
 if guest_attr.is_null() {
 let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::zeroed();
 libc::pthread_mutexattr_init(attr.as_mut_ptr());
 libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc_kind(kind));
 libc::pthread_mutex_init(native.as_mut_ptr(), attr.as_ptr());
 libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
 } else {
 libc::pthread_mutex_init(native.as_mut_ptr(), guest_attr);
 }
 alloc_host(native.assume_init())
 }
}

/// "use": lazy static initialization. An unmapped overlay backed by
/// one of the three recognized guest bit patterns is promoted to a real
/// host mutex of the matching kind; an already-mapped overlay is used
/// directly.
fn ensure_init(overlay: &Overlay) -> *mut libc::pthread_mutex_t {
 if overlay.is_resident() {
 return overlay.get() as *mut libc::pthread_mutex_t;
 }
 let kind = kind_for_bit_pattern(overlay.raw_bits());
 let host = unsafe { init_host(kind, std::ptr::null()) };
 overlay.set(host as usize);
 host
}

/// # Safety
/// `guest` must point at guest-owned mutex storage; `attr`, if non-null,
/// must point at a previously `bionic_pthread_mutexattr_init`-ed attribute.
pub unsafe extern "C" fn bionic_pthread_mutex_init(
 guest: *mut c_void,
 attr: *const c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 let host = unsafe { init_host(Kind::Normal, attr as *const libc::pthread_mutexattr_t) };
 overlay.set(host as usize);
 let _ = host; // pthread_mutex_init already ran inside init_host; mirror original's "always succeeds here" return.
 0
}

/// # Safety
/// `guest` must point at guest-owned mutex storage.
pub unsafe extern "C" fn bionic_pthread_mutex_destroy(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 if !overlay.is_resident() {
 return 0;
 }
 let host = overlay.get() as *mut libc::pthread_mutex_t;
 let rc = unsafe { libc::pthread_mutex_destroy(host) };
 unsafe { free_host(host) };
 overlay.set(0);
 rc
}

/// # Safety
/// `guest` must point at guest-owned mutex storage.
pub unsafe extern "C" fn bionic_pthread_mutex_lock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_mutex_lock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned mutex storage.
pub unsafe extern "C" fn bionic_pthread_mutex_trylock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_mutex_trylock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned mutex storage.
pub unsafe extern "C" fn bionic_pthread_mutex_unlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_mutex_unlock(ensure_init(overlay)) }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn bit_pattern_decodes_to_recognized_kinds() {
 assert!(matches!(kind_for_bit_pattern(0), Kind::Normal));
 assert!(matches!(kind_for_bit_pattern(1 << KIND_SHIFT), Kind::Recursive));
 assert!(matches!(kind_for_bit_pattern(2 << KIND_SHIFT), Kind::ErrorCheck));
 }

 #[test]
 fn lazy_init_then_lock_unlock_round_trips() {
 let mut storage: usize = 0; // PTHREAD_MUTEX_INITIALIZER-equivalent bit pattern
 let guest = &mut storage as *mut usize as *mut c_void;
 unsafe {
 assert_eq!(bionic_pthread_mutex_lock(guest), 0);
 assert_eq!(bionic_pthread_mutex_unlock(guest), 0);
 assert_eq!(bionic_pthread_mutex_destroy(guest), 0);
 }
 }

 #[test]
 fn explicit_init_recursive_allows_relock() {
 let mut storage: usize = 0;
 let guest = &mut storage as *mut usize as *mut c_void;
 unsafe {
 let mut attr = MaybeUninit::<libc::pthread_mutexattr_t>::zeroed();
 libc::pthread_mutexattr_init(attr.as_mut_ptr());
 libc::pthread_mutexattr_settype(attr.as_mut_ptr(), libc::PTHREAD_MUTEX_RECURSIVE);
 assert_eq!(
 bionic_pthread_mutex_init(guest, attr.as_ptr() as *const c_void),
 0
);
 assert_eq!(bionic_pthread_mutex_lock(guest), 0);
 assert_eq!(bionic_pthread_mutex_lock(guest), 0);
 assert_eq!(bionic_pthread_mutex_unlock(guest), 0);
 assert_eq!(bionic_pthread_mutex_unlock(guest), 0);
 assert_eq!(bionic_pthread_mutex_destroy(guest), 0);
 libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
 }
 }
}
