//! Guest pthread cleanup frames and the non-local-goto save point used by
//! step 5 (the `setjmp` special case).
//!
//! Grounded on `original_source/pthread_wrapper/libpthread.c`'s
//! `bionic___pthread_cleanup_push`/`_pop`: a per-thread, intrusively linked
//! stack of `(routine, arg)` frames, pushed on cleanup-scope entry and
//! popped (optionally running the routine) on exit or during unwind.
use std::cell::RefCell;
use std::ffi::c_void;

type CleanupRoutine = extern "C" fn(*mut c_void);

struct Frame {
 routine: CleanupRoutine,
 arg: *mut c_void,
}

thread_local! {
 static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// # Safety
/// `routine` must be callable with `arg` for as long as the frame remains
/// pushed.
pub(crate) unsafe extern "C" fn bionic_pthread_cleanup_push(routine: CleanupRoutine, arg: *mut c_void) {
 STACK.with(|s| s.borrow_mut().push(Frame { routine, arg }));
}

/// Pops the innermost frame, running its routine iff `execute != 0`, as the
/// guest's own `pthread_cleanup_pop(execute)` would.
pub(crate) extern "C" fn bionic_pthread_cleanup_pop(execute: libc::c_int) {
 let frame = STACK.with(|s| s.borrow_mut().pop());
 if let Some(frame) = frame {
 if execute != 0 {
 (frame.routine)(frame.arg);
 }
 }
}

unsafe extern "C" {
 #[cfg_attr(target_os = "linux", link_name = "setjmp")]
 fn host_setjmp(env: *mut c_void) -> libc::c_int;
}

/// step 5: a guest reference to its own `setjmp` is redirected here
/// instead of through ordinary symbol resolution, because the guest's own
/// definition captures registers in its own (possibly incompatible) jump
/// buffer layout; this crate always runs on the host's native architecture,
/// so delegating straight to the host's `setjmp` against the same buffer is
/// correct without any register-layout translation.
///
/// # Safety
/// `env` must point at a buffer large enough for the host's `jmp_buf`.
pub(crate) unsafe extern "C" fn guest_setjmp(env: *mut c_void) -> libc::c_int {
 unsafe { host_setjmp(env) }
}

#[cfg(test)]
mod tests {
 use super::*;
 use std::sync::atomic::{AtomicUsize, Ordering};

 static RAN: AtomicUsize = AtomicUsize::new(0);

 extern "C" fn mark(_arg: *mut c_void) {
 RAN.fetch_add(1, Ordering::SeqCst);
 }

 #[test]
 fn pop_with_execute_runs_the_routine() {
 RAN.store(0, Ordering::SeqCst);
 unsafe { bionic_pthread_cleanup_push(mark, std::ptr::null_mut()) };
 bionic_pthread_cleanup_pop(1);
 assert_eq!(RAN.load(Ordering::SeqCst), 1);
 }

 #[test]
 fn pop_without_execute_skips_the_routine() {
 RAN.store(0, Ordering::SeqCst);
 unsafe { bionic_pthread_cleanup_push(mark, std::ptr::null_mut()) };
 bionic_pthread_cleanup_pop(0);
 assert_eq!(RAN.load(Ordering::SeqCst), 0);
 }

 #[test]
 fn frames_unwind_in_lifo_order() {
 thread_local! {
 static ORDER: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
 }
 extern "C" fn push_one(_arg: *mut c_void) {
 ORDER.with(|o| o.borrow_mut().push(1));
 }
 extern "C" fn push_two(_arg: *mut c_void) {
 ORDER.with(|o| o.borrow_mut().push(2));
 }
 unsafe {
 bionic_pthread_cleanup_push(push_one, std::ptr::null_mut());
 bionic_pthread_cleanup_push(push_two, std::ptr::null_mut());
 }
 bionic_pthread_cleanup_pop(1);
 bionic_pthread_cleanup_pop(1);
 ORDER.with(|o| assert_eq!(*o.borrow(), vec![2, 1]));
 }
}
