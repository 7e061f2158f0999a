//! ELF reader (C1): validates the guest image and computes its load extents.
use crate::arch::{E_CLASS, EHDR_SIZE, EM_ARCH, Ehdr as RawEhdr, PHDR_SIZE, Phdr};
use crate::error::{Result, parse_ehdr_error};
use crate::object::ElfObject;
use elf::abi::{EI_NIDENT, ET_DYN};
use elf::endian::NativeEndian;
use elf::file::{FileHeader, parse_ident};

/// Trailer written by a prelinker: four bytes little-endian address,
/// followed by the four-byte ASCII tag `"PRE "`.
const PRELINK_TAG: [u8; 4] = *b"PRE ";

pub(crate) struct ElfHeader {
 ehdr: FileHeader<NativeEndian>,
}

impl ElfHeader {
 pub(crate) fn parse(data: &[u8]) -> Result<Self> {
 if data.len() < EHDR_SIZE {
 return Err(parse_ehdr_error("file too small for an ELF header"));
 }
 let ident_buf = &data[..EI_NIDENT];
 let tail_buf = &data[EI_NIDENT..EHDR_SIZE];
 let ident = parse_ident::<NativeEndian>(ident_buf).map_err(|e| parse_ehdr_error(e.to_string()))?;
 let ehdr = FileHeader::parse_tail(ident, tail_buf).map_err(|e| parse_ehdr_error(e.to_string()))?;
 Ok(ElfHeader { ehdr })
 }

 pub(crate) fn validate(&self) -> Result<()> {
 if self.ehdr.e_type != ET_DYN {
 return Err(parse_ehdr_error("guest object is not ET_DYN"));
 }
 if self.ehdr.e_machine != EM_ARCH {
 return Err(parse_ehdr_error("guest object architecture mismatch"));
 }
 if self.ehdr.class != E_CLASS {
 return Err(parse_ehdr_error("guest object class mismatch"));
 }
 Ok(())
 }

 pub(crate) fn e_entry(&self) -> usize {
 self.ehdr.e_entry as usize
 }

 pub(crate) fn e_phnum(&self) -> usize {
 self.ehdr.e_phnum as usize
 }

 pub(crate) fn e_phoff(&self) -> usize {
 self.ehdr.e_phoff as usize
 }

 pub(crate) fn phdr_range(&self) -> (usize, usize) {
 let start = self.e_phoff();
 (start, start + self.e_phnum() * PHDR_SIZE)
 }
}

/// Load extents of a guest object: the page-rounded `[min_vaddr, max_vaddr)`
/// range every `PT_LOAD` entry falls within, plus the requested prelink base
/// (`None` for a non-prelinked image).
pub(crate) struct LoadExtent {
 pub(crate) min_vaddr: usize,
 pub(crate) max_vaddr: usize,
 pub(crate) prelink_base: Option<usize>,
}

impl LoadExtent {
 pub(crate) fn reservation_size(&self) -> usize {
 self.max_vaddr - self.min_vaddr
 }
}

const PAGE_SIZE: usize = 0x1000;
const MASK: usize = !(PAGE_SIZE - 1);

pub(crate) fn compute_load_extent(phdrs: &[Phdr], file_len: usize, object: &mut impl ElfObject) -> Result<LoadExtent> {
 use elf::abi::PT_LOAD;

 let mut min_vaddr = usize::MAX;
 let mut max_vaddr = 0usize;
 for phdr in phdrs {
 if phdr.p_type == PT_LOAD {
 let start = phdr.p_vaddr as usize;
 let end = start + phdr.p_memsz as usize;
 min_vaddr = min_vaddr.min(start);
 max_vaddr = max_vaddr.max(end);
 }
 }
 if min_vaddr == usize::MAX {
 return Err(parse_ehdr_error("guest object has no PT_LOAD segments"));
 }
 min_vaddr &= MASK;
 max_vaddr = (max_vaddr + PAGE_SIZE - 1) & MASK;

 let prelink_base = read_prelink_tag(file_len, object)?;

 Ok(LoadExtent {
 min_vaddr,
 max_vaddr,
 prelink_base,
 })
}

fn read_prelink_tag(file_len: usize, object: &mut impl ElfObject) -> Result<Option<usize>> {
 if file_len < 8 {
 return Ok(None);
 }
 let mut trailer = [0u8; 8];
 if object.read(&mut trailer, file_len - 8).is_err() {
 return Ok(None);
 }
 if trailer[4..8] != PRELINK_TAG {
 return Ok(None);
 }
 let base = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
 Ok(Some(base as usize))
}
