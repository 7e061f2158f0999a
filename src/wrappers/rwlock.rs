//! Guest `pthread_rwlock_t` wrapper, grounded on `libpthread.c`'s
//! `bionic_pthread_rwlock_init`/`_rdlock`/`_wrlock`/`_unlock`/`_destroy`.
use super::{Overlay, alloc_host, free_host};
use std::ffi::c_void;
use std::mem::MaybeUninit;

unsafe fn init_host(guest_attr: *const libc::pthread_rwlockattr_t) -> *mut libc::pthread_rwlock_t {
 unsafe {
 let mut native = MaybeUninit::<libc::pthread_rwlock_t>::zeroed();
 libc::pthread_rwlock_init(native.as_mut_ptr(), guest_attr);
 alloc_host(native.assume_init())
 }
}

fn ensure_init(overlay: &Overlay) -> *mut libc::pthread_rwlock_t {
 if overlay.is_resident() {
 return overlay.get() as *mut libc::pthread_rwlock_t;
 }
 let host = unsafe { init_host(std::ptr::null()) };
 overlay.set(host as usize);
 host
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_init(guest: *mut c_void, attr: *const c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 let host = unsafe { init_host(attr as *const libc::pthread_rwlockattr_t) };
 overlay.set(host as usize);
 0
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_destroy(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 if !overlay.is_resident() {
 return 0;
 }
 let host = overlay.get() as *mut libc::pthread_rwlock_t;
 let rc = unsafe { libc::pthread_rwlock_destroy(host) };
 unsafe { free_host(host) };
 overlay.set(0);
 rc
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_rdlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_rwlock_rdlock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_wrlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_rwlock_wrlock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_tryrdlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_rwlock_tryrdlock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_trywrlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_rwlock_trywrlock(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned rwlock storage.
pub unsafe extern "C" fn bionic_pthread_rwlock_unlock(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_rwlock_unlock(ensure_init(overlay)) }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn lazy_init_rdlock_then_unlock_round_trips() {
 let mut storage: usize = 0;
 let guest = &mut storage as *mut usize as *mut c_void;
 unsafe {
 assert_eq!(bionic_pthread_rwlock_rdlock(guest), 0);
 assert_eq!(bionic_pthread_rwlock_unlock(guest), 0);
 assert_eq!(bionic_pthread_rwlock_destroy(guest), 0);
 }
 }
}
