//! Guest `pthread_cond_t` wrapper, grounded on `libpthread.c`'s
//! `bionic_pthread_cond_init`/`_wait`/`_signal`/`_broadcast`/`_destroy`:
//! unlike mutexes, bionic conds carry no kind bits, so lazy initialization
//! always produces a default host condvar.
use super::{Overlay, alloc_host, free_host};
use std::ffi::c_void;
use std::mem::MaybeUninit;

unsafe fn init_host(guest_attr: *const libc::pthread_condattr_t) -> *mut libc::pthread_cond_t {
 unsafe {
 let mut native = MaybeUninit::<libc::pthread_cond_t>::zeroed();
 libc::pthread_cond_init(native.as_mut_ptr(), guest_attr);
 alloc_host(native.assume_init())
 }
}

fn ensure_init(overlay: &Overlay) -> *mut libc::pthread_cond_t {
 if overlay.is_resident() {
 return overlay.get() as *mut libc::pthread_cond_t;
 }
 let host = unsafe { init_host(std::ptr::null()) };
 overlay.set(host as usize);
 host
}

/// # Safety
/// `guest` must point at guest-owned cond storage.
pub unsafe extern "C" fn bionic_pthread_cond_init(guest: *mut c_void, attr: *const c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 let host = unsafe { init_host(attr as *const libc::pthread_condattr_t) };
 overlay.set(host as usize);
 0
}

/// # Safety
/// `guest` must point at guest-owned cond storage.
pub unsafe extern "C" fn bionic_pthread_cond_destroy(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 if !overlay.is_resident() {
 return 0;
 }
 let host = overlay.get() as *mut libc::pthread_cond_t;
 let rc = unsafe { libc::pthread_cond_destroy(host) };
 unsafe { free_host(host) };
 overlay.set(0);
 rc
}

/// # Safety
/// `guest_cond` and `guest_mutex` must point at guest-owned storage, with
/// the mutex already locked by the caller.
pub unsafe extern "C" fn bionic_pthread_cond_wait(guest_cond: *mut c_void, guest_mutex: *mut c_void) -> libc::c_int {
 let cond_overlay = unsafe { Overlay::from_raw(guest_cond) };
 // The mutex must already be locked by the caller, which means it has
 // already gone through its own lazy `ensure_init` and is resident.
 let mutex_overlay = unsafe { Overlay::from_raw(guest_mutex) };
 let host_mutex = mutex_overlay.get() as *mut libc::pthread_mutex_t;
 unsafe { libc::pthread_cond_wait(ensure_init(cond_overlay), host_mutex) }
}

/// # Safety
/// `guest` must point at guest-owned cond storage.
pub unsafe extern "C" fn bionic_pthread_cond_signal(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_cond_signal(ensure_init(overlay)) }
}

/// # Safety
/// `guest` must point at guest-owned cond storage.
pub unsafe extern "C" fn bionic_pthread_cond_broadcast(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::pthread_cond_broadcast(ensure_init(overlay)) }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn lazy_init_then_signal_and_destroy_round_trips() {
 let mut storage: usize = 0;
 let guest = &mut storage as *mut usize as *mut c_void;
 unsafe {
 assert_eq!(bionic_pthread_cond_signal(guest), 0);
 assert_eq!(bionic_pthread_cond_broadcast(guest), 0);
 assert_eq!(bionic_pthread_cond_destroy(guest), 0);
 }
 }
}
