//! Low-level memory mapping operations used by the segment mapper (C2).
//!
//! This mirrors the teacher's `Mmap` trait split: a thin, OS-agnostic
//! interface, with the actual syscalls isolated behind it so the segment
//! mapper never touches `libc` directly.
use crate::error::{Result, mmap_error};
use bitflags::bitflags;
use core::ffi::c_int;
use std::ptr::NonNull;

bitflags! {
 #[derive(Clone, Copy, Debug)]
 /// Desired memory protection of a mapping.
 pub struct ProtFlags: c_int {
 const PROT_NONE = 0;
 const PROT_READ = 1;
 const PROT_WRITE = 2;
 const PROT_EXEC = 4;
 }
}

bitflags! {
 #[derive(Clone, Copy, Debug)]
 /// Additional parameters for a mapping.
 pub struct MapFlags: c_int {
 const MAP_PRIVATE = 2;
 const MAP_FIXED = 16;
 const MAP_ANONYMOUS = 32;
 }
}

/// Platform mapping primitive. The loader is built against the `libc`
/// implementation below; the trait exists so tests can swap in a fake
/// backend without touching real address space.
pub trait Mmap {
 /// Maps `len` bytes (already page-rounded) at `addr` (if given) with
 /// `prot`/`flags`, optionally backed by `fd` at `offset`. Sets
 /// `need_copy` when the caller still has to manually copy file content
 /// in (e.g. anonymous-then-copy fallback).
 unsafe fn mmap(
 addr: Option<usize>,
 len: usize,
 prot: ProtFlags,
 flags: MapFlags,
 offset: usize,
 fd: Option<i32>,
 need_copy: &mut bool) -> Result<NonNull<core::ffi::c_void>>;

 unsafe fn mmap_anonymous(
 addr: usize,
 len: usize,
 prot: ProtFlags,
 flags: MapFlags) -> Result<NonNull<core::ffi::c_void>>;

 unsafe fn munmap(addr: NonNull<core::ffi::c_void>, len: usize) -> Result<()>;

 unsafe fn mprotect(addr: NonNull<core::ffi::c_void>, len: usize, prot: ProtFlags) -> Result<()>;

 /// Reserves `len` bytes of address space with no access rights, either
 /// at a fixed `addr` (prelinked case) or wherever the kernel chooses.
 unsafe fn mmap_reserve(addr: Option<usize>, len: usize) -> Result<NonNull<core::ffi::c_void>> {
 let mut need_copy = false;
 unsafe {
 Self::mmap(
 addr,
 len,
 ProtFlags::PROT_NONE,
 MapFlags::MAP_PRIVATE
 | MapFlags::MAP_ANONYMOUS
 | if addr.is_some() {
 MapFlags::MAP_FIXED
 } else {
 MapFlags::empty()
 },
 0,
 None,
 &mut need_copy)
 }
 }
}

/// `libc`-backed implementation of [`Mmap`], used on every supported host.
pub struct LibcMmap;

impl Mmap for LibcMmap {
 unsafe fn mmap(
 addr: Option<usize>,
 len: usize,
 prot: ProtFlags,
 flags: MapFlags,
 offset: usize,
 fd: Option<i32>,
 need_copy: &mut bool) -> Result<NonNull<core::ffi::c_void>> {
 let ptr = if let Some(fd) = fd {
 unsafe {
 libc::mmap(
 addr.unwrap_or(0) as _,
 len,
 prot.bits(),
 flags.bits(),
 fd,
 offset as libc::off_t)
 }
 } else {
 *need_copy = true;
 unsafe {
 libc::mmap(
 addr.unwrap_or(0) as _,
 len,
 prot.bits(),
 (flags | MapFlags::MAP_ANONYMOUS).bits(),
 -1,
 0)
 }
 };
 if ptr == libc::MAP_FAILED {
 return Err(mmap_error("mmap failed"));
 }
 Ok(unsafe { NonNull::new_unchecked(ptr) })
 }

 unsafe fn mmap_anonymous(
 addr: usize,
 len: usize,
 prot: ProtFlags,
 flags: MapFlags) -> Result<NonNull<core::ffi::c_void>> {
 let ptr = unsafe {
 libc::mmap(
 addr as _,
 len,
 prot.bits(),
 flags.union(MapFlags::MAP_ANONYMOUS).bits(),
 -1,
 0)
 };
 if ptr == libc::MAP_FAILED {
 return Err(mmap_error("anonymous mmap failed"));
 }
 Ok(unsafe { NonNull::new_unchecked(ptr) })
 }

 unsafe fn munmap(addr: NonNull<core::ffi::c_void>, len: usize) -> Result<()> {
 let res = unsafe { libc::munmap(addr.as_ptr(), len) };
 if res != 0 {
 return Err(mmap_error("munmap failed"));
 }
 Ok(())
 }

 unsafe fn mprotect(addr: NonNull<core::ffi::c_void>, len: usize, prot: ProtFlags) -> Result<()> {
 let res = unsafe { libc::mprotect(addr.as_ptr(), len, prot.bits()) };
 if res != 0 {
 return Err(mmap_error("mprotect failed"));
 }
 Ok(())
 }
}

/// Checks whether `addr` falls on a currently resident (mapped) page.
///
/// This backs the guest-opaque wrapper overlay probe (C11): `mincore` on a
/// single page tells us whether the kernel has a mapping there at all,
/// without faulting if it doesn't.
pub(crate) fn is_resident(addr: usize) -> bool {
 const PAGE_SIZE: usize = 0x1000;
 let page = addr & !(PAGE_SIZE - 1);
 let mut vec = [0u8; 1];
 let res = unsafe {
 libc::mincore(page as *mut core::ffi::c_void, PAGE_SIZE, vec.as_mut_ptr())
 };
 res == 0
}
