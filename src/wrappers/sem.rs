//! Guest `sem_t` wrapper, grounded on `libpthread.c`'s
//! `bionic_sem_init`/`_wait`/`_trywait`/`_post`/`_destroy`/`_getvalue`.
//! Unlike the pthread primitives, bionic semaphores have no static
//! (`= SEM_INITIALIZER`-style) form, so there is no lazy-use path: a
//! semaphore must go through `bionic_sem_init` before any other call.
use super::{Overlay, alloc_host, free_host};
use std::ffi::c_void;
use std::mem::MaybeUninit;

/// # Safety
/// `guest` must point at guest-owned semaphore storage.
pub unsafe extern "C" fn bionic_sem_init(
 guest: *mut c_void,
 pshared: libc::c_int,
 value: libc::c_uint) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 let mut native = MaybeUninit::<libc::sem_t>::zeroed();
 let rc = unsafe { libc::sem_init(native.as_mut_ptr(), pshared, value) };
 if rc != 0 {
 return rc;
 }
 let host = alloc_host(unsafe { native.assume_init() });
 overlay.set(host as usize);
 0
}

/// # Safety
/// `guest` must point at a semaphore previously initialized by
/// [`bionic_sem_init`].
pub unsafe extern "C" fn bionic_sem_destroy(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 if !overlay.is_resident() {
 return 0;
 }
 let host = overlay.get() as *mut libc::sem_t;
 let rc = unsafe { libc::sem_destroy(host) };
 unsafe { free_host(host) };
 overlay.set(0);
 rc
}

/// # Safety
/// `guest` must point at a semaphore previously initialized by
/// [`bionic_sem_init`].
pub unsafe extern "C" fn bionic_sem_wait(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::sem_wait(overlay.get() as *mut libc::sem_t) }
}

/// # Safety
/// `guest` must point at a semaphore previously initialized by
/// [`bionic_sem_init`].
pub unsafe extern "C" fn bionic_sem_trywait(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::sem_trywait(overlay.get() as *mut libc::sem_t) }
}

/// # Safety
/// `guest` must point at a semaphore previously initialized by
/// [`bionic_sem_init`].
pub unsafe extern "C" fn bionic_sem_post(guest: *mut c_void) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::sem_post(overlay.get() as *mut libc::sem_t) }
}

/// # Safety
/// `guest` must point at a semaphore previously initialized by
/// [`bionic_sem_init`]; `out` must be a valid write target.
pub unsafe extern "C" fn bionic_sem_getvalue(guest: *mut c_void, out: *mut libc::c_int) -> libc::c_int {
 let overlay = unsafe { Overlay::from_raw(guest) };
 unsafe { libc::sem_getvalue(overlay.get() as *mut libc::sem_t, out) }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn init_post_wait_destroy_round_trips() {
 let mut storage: usize = 0;
 let guest = &mut storage as *mut usize as *mut c_void;
 unsafe {
 assert_eq!(bionic_sem_init(guest, 0, 1), 0);
 assert_eq!(bionic_sem_wait(guest), 0);
 assert_eq!(bionic_sem_post(guest), 0);
 let mut value: libc::c_int = 0;
 assert_eq!(bionic_sem_getvalue(guest, &mut value), 0);
 assert_eq!(value, 1);
 assert_eq!(bionic_sem_destroy(guest), 0);
 }
 }
}
