//! Segment mapper (C2): reserves the module's virtual range, maps each
//! `PT_LOAD` entry, zero-fills BSS, and tracks the write-protect window and
//! GNU_RELRO extent used by the relocation engine and the unload path.
use crate::arch::Phdr;
use crate::ehdr::LoadExtent;
use crate::error::{Result, mmap_error};
use crate::mmap::{LibcMmap, MapFlags, Mmap, ProtFlags};
use crate::object::ElfObject;
use elf::abi::{PF_W, PF_X, PT_GNU_RELRO, PT_LOAD};
use std::ffi::c_void;
use std::ptr::NonNull;

pub(crate) const PAGE_SIZE: usize = 0x1000;
const MASK: usize = !(PAGE_SIZE - 1);

#[inline]
fn roundup(x: usize, align: usize) -> usize {
 (x + align - 1) & !(align - 1)
}

#[inline]
fn rounddown(x: usize, align: usize) -> usize {
 x & !(align - 1)
}

fn map_prot(p_flags: u32) -> ProtFlags {
 let mut prot = ProtFlags::PROT_READ;
 if p_flags & PF_W != 0 {
 prot |= ProtFlags::PROT_WRITE;
 }
 if p_flags & PF_X != 0 {
 prot |= ProtFlags::PROT_EXEC;
 }
 prot
}

/// The mapped address space of one guest module. Dropping it unmaps the
/// whole reservation.
pub(crate) struct ElfSegments {
 base: usize,
 len: usize,
}

impl ElfSegments {
 /// A zero-length reservation for pool/registry bookkeeping tests; `Drop`
 /// never calls `munmap` for it since `len` is zero.
 #[cfg(test)]
 pub(crate) unsafe fn empty() -> Self {
 ElfSegments { base: 0, len: 0 }
 }

 pub(crate) fn base(&self) -> usize {
 self.base
 }

 pub(crate) fn len(&self) -> usize {
 self.len
 }

 #[inline]
 pub(crate) fn get_ptr<T>(&self, vaddr: usize) -> *const T {
 (self.base + vaddr) as *const T
 }

 #[inline]
 pub(crate) fn get_mut_ptr<T>(&self, vaddr: usize) -> *mut T {
 (self.base + vaddr) as *mut T
 }

 /// # Safety
 /// Caller must ensure `[vaddr, vaddr+len)` lies within the reservation
 /// and that `T` matches the data stored there.
 pub(crate) unsafe fn get_slice<T>(&self, vaddr: usize, byte_len: usize) -> &'static [T] {
 unsafe {
 std::slice::from_raw_parts(self.get_ptr::<T>(vaddr), byte_len / size_of::<T>())
 }
 }
}

impl Drop for ElfSegments {
 fn drop(&mut self) {
 if self.len > 0 {
 if let Some(ptr) = NonNull::new(self.base as *mut c_void) {
 let _ = unsafe { LibcMmap::munmap(ptr, self.len) };
 }
 }
 }
}

/// Union of read-only `PT_LOAD` extents that were temporarily made writable
/// for relocation and must be restored afterward.
#[derive(Default)]
pub(crate) struct WriteProtectWindow {
 ranges: Vec<(usize, usize, ProtFlags)>,
}

impl WriteProtectWindow {
 fn push(&mut self, start: usize, end: usize, original: ProtFlags) {
 self.ranges.push((start, end, original));
 }

 pub(crate) fn restore(&self) -> Result<()> {
 for &(start, end, prot) in &self.ranges {
 let ptr = NonNull::new(start as *mut c_void).ok_or_else(|| mmap_error("null protect range"))?;
 unsafe { LibcMmap::mprotect(ptr, end - start, prot)? };
 }
 Ok(())
 }
}

/// A `PT_GNU_RELRO` extent. Applied read-only once relocation completes and
/// never un-protected again (the DT_NEEDED side table means no in-place
/// guest-image write survives past link time).
pub(crate) struct Relro {
 addr: usize,
 len: usize,
}

impl Relro {
 pub(crate) fn new(phdr: &Phdr, base: usize) -> Self {
 Relro {
 addr: base + phdr.p_vaddr as usize,
 len: phdr.p_memsz as usize,
 }
 }

 pub(crate) fn protect(&self) -> Result<()> {
 let start = rounddown(self.addr, PAGE_SIZE);
 let end = roundup(self.addr + self.len, PAGE_SIZE);
 let ptr = NonNull::new(start as *mut c_void).ok_or_else(|| mmap_error("null relro range"))?;
 unsafe { LibcMmap::mprotect(ptr, end - start, ProtFlags::PROT_READ) }
 }
}

pub(crate) struct MappedImage {
 pub(crate) segments: ElfSegments,
 pub(crate) relro: Option<Relro>,
 pub(crate) write_protect: WriteProtectWindow,
}

/// Reserves the module's address range and maps every `PT_LOAD` entry into
/// it, matching : prelinked images get a fixed anonymous reservation
/// (failing outright if it cannot be honored), non-prelinked images get an
/// unconstrained one.
pub(crate) fn load_segments(
 phdrs: &[Phdr],
 extent: &LoadExtent,
 object: &mut impl ElfObject) -> Result<MappedImage> {
 let len = extent.reservation_size();
 let requested_addr = extent.prelink_base.map(|b| b & MASK);

 let mut need_copy = false;
 let reservation = unsafe {
 LibcMmap::mmap(
 requested_addr,
 len,
 ProtFlags::PROT_NONE,
 MapFlags::MAP_PRIVATE
 | MapFlags::MAP_ANONYMOUS
 | if requested_addr.is_some() {
 MapFlags::MAP_FIXED
 } else {
 MapFlags::empty()
 },
 0,
 None,
 &mut need_copy)?
 };
 let base = reservation.as_ptr() as usize - extent.min_vaddr;

 let mut write_protect = WriteProtectWindow::default();
 let mut relro = None;

 for phdr in phdrs {
 match phdr.p_type {
 PT_LOAD => map_one_segment(base, phdr, object, &mut write_protect)?,
 PT_GNU_RELRO => relro = Some(Relro::new(phdr, base)),
 _ => {}
 }
 }

 Ok(MappedImage {
 segments: ElfSegments { base, len },
 relro,
 write_protect,
 })
}

fn map_one_segment(
 base: usize,
 phdr: &Phdr,
 object: &mut impl ElfObject,
 write_protect: &mut WriteProtectWindow) -> Result<()> {
 let min_vaddr = phdr.p_vaddr as usize & MASK;
 let max_vaddr = roundup(phdr.p_vaddr as usize + phdr.p_memsz as usize, PAGE_SIZE);
 let map_len = max_vaddr - min_vaddr;
 let addr = base + min_vaddr;
 let file_prot = map_prot(phdr.p_flags);
 // the relocation engine may need to patch read-only text/data; map
 // writable now and restore afterward via the write-protect window.
 let map_prot_now = file_prot | ProtFlags::PROT_WRITE;

 let aligned_offset = phdr.p_offset as usize & MASK;
 let align_skew = phdr.p_offset as usize - aligned_offset;
 let filesz = phdr.p_filesz as usize + align_skew;

 // object is never fd-backed in this crate (guest bytes are read through
 // `ElfObject::read`, not mmapped from a descriptor), so this always
 // comes back as an anonymous mapping the caller must fill in by hand.
 let mut need_copy = false;
 let ptr = unsafe {
 LibcMmap::mmap(
 Some(addr),
 map_len,
 map_prot_now,
 MapFlags::MAP_PRIVATE | MapFlags::MAP_FIXED,
 aligned_offset,
 None,
 &mut need_copy)?
 };
 if need_copy {
 let dest = unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr().cast::<u8>(), filesz) };
 object.read(dest, aligned_offset)?;
 }

 if phdr.p_memsz != phdr.p_filesz {
 let content_end = phdr.p_vaddr as usize + phdr.p_filesz as usize;
 let zero_start = base + content_end;
 let zero_end_page = roundup(zero_start, PAGE_SIZE);
 let fill_len = zero_end_page - zero_start;
 if fill_len > 0 {
 unsafe { std::ptr::write_bytes(zero_start as *mut u8, 0, fill_len) };
 }
 let anon_end = base + max_vaddr;
 if zero_end_page < anon_end {
 unsafe {
 LibcMmap::mmap_anonymous(
 zero_end_page,
 anon_end - zero_end_page,
 file_prot,
 MapFlags::MAP_PRIVATE | MapFlags::MAP_FIXED)?;
 }
 }
 }

 if file_prot & ProtFlags::PROT_WRITE != ProtFlags::PROT_WRITE {
 write_protect.push(addr, addr + map_len, file_prot);
 }

 Ok(())
}
