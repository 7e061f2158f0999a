//! Dynamic-section parser (C3): walks `DT_*` entries into typed extents.
use crate::arch::{DT_RELR, DT_RELRSZ, Dyn, ElfRel, ElfRela, ElfRelType, ElfRelr};
use crate::error::{Result, parse_dynamic_error};
use crate::segment::ElfSegments;
use elf::abi::*;
use std::num::NonZeroUsize;
use std::ptr::NonNull;

/// Which hash table style a module carries (prefers GNU over SysV).
pub(crate) enum HashTab {
 Gnu(usize),
 Sysv(usize),
}

/// Parsed contents of a module's `.dynamic` section, already rebased to
/// absolute addresses by the segment base.
pub(crate) struct ElfDynamic {
 /// Address of the first `Dyn` entry, kept so `DT_DEBUG` can be rewritten
 /// in place once the registry knows the process-wide debugger anchor.
 pub(crate) dyn_ptr: *mut Dyn,
 pub(crate) hashtab: HashTab,
 pub(crate) symtab: usize,
 pub(crate) strtab: usize,
 pub(crate) got_plt: Option<NonNull<usize>>,
 pub(crate) init_fn: Option<unsafe extern "C" fn()>,
 pub(crate) init_array: Option<&'static [unsafe extern "C" fn()]>,
 pub(crate) preinit_array: Option<&'static [unsafe extern "C" fn()]>,
 pub(crate) fini_fn: Option<unsafe extern "C" fn()>,
 pub(crate) fini_array: Option<&'static [unsafe extern "C" fn()]>,
 pub(crate) pltrel: Option<&'static [ElfRelType]>,
 pub(crate) pltrel_is_rela: Option<bool>,
 pub(crate) dynrel: Option<&'static [ElfRelType]>,
 pub(crate) relr: Option<&'static [ElfRelr]>,
 /// String-table offsets of each `DT_NEEDED` entry, in declaration order —
 /// the side table in `module.rs` is indexed in parallel with this.
 pub(crate) needed_libs: Vec<usize>,
}

impl ElfDynamic {
 pub(crate) fn parse(dynamic_ptr: *mut Dyn, segments: &ElfSegments) -> Result<Self> {
 let base = segments.base();

 let mut symtab_off = None;
 let mut strtab_off = None;
 let mut elf_hash_off = None;
 let mut gnu_hash_off = None;
 let mut got_off = None;
 let mut pltrel_size: Option<usize> = None;
 let mut pltrel_off: Option<usize> = None;
 let mut pltrel_is_rela = None;
 let mut rel_off: Option<usize> = None;
 let mut rel_size: Option<usize> = None;
 let mut is_rela = None;
 let mut relr_off: Option<usize> = None;
 let mut relr_size: Option<usize> = None;
 let mut init_off = None;
 let mut fini_off = None;
 let mut init_array_off: Option<usize> = None;
 let mut init_array_size: Option<usize> = None;
 let mut preinit_array_off: Option<usize> = None;
 let mut preinit_array_size: Option<usize> = None;
 let mut fini_array_off: Option<usize> = None;
 let mut fini_array_size: Option<usize> = None;
 let mut got_flags = 0i64;
 let mut needed_libs = Vec::new();

 let mut cur = dynamic_ptr;
 loop {
 let entry = unsafe { &*cur };
 match entry.d_tag as i64 {
 DT_NULL => break,
 DT_NEEDED => needed_libs.push(entry.d_un as usize),
 DT_HASH => elf_hash_off = Some(entry.d_un as usize),
 DT_GNU_HASH => gnu_hash_off = Some(entry.d_un as usize),
 DT_STRTAB => strtab_off = Some(entry.d_un as usize),
 DT_SYMTAB => symtab_off = Some(entry.d_un as usize),
 DT_PLTGOT => got_off = Some(entry.d_un as usize),
 DT_PLTRELSZ => pltrel_size = Some(entry.d_un as usize),
 DT_PLTREL => pltrel_is_rela = Some(entry.d_un as i64 == DT_RELA),
 DT_JMPREL => pltrel_off = Some(entry.d_un as usize),
 DT_RELA | DT_REL => {
 is_rela = Some(entry.d_tag as i64 == DT_RELA);
 rel_off = Some(entry.d_un as usize);
 }
 DT_RELASZ | DT_RELSZ => rel_size = Some(entry.d_un as usize),
 DT_RELR => relr_off = Some(entry.d_un as usize),
 DT_RELRSZ => relr_size = Some(entry.d_un as usize),
 DT_INIT => init_off = Some(entry.d_un as usize),
 DT_FINI => fini_off = Some(entry.d_un as usize),
 DT_INIT_ARRAY => init_array_off = Some(entry.d_un as usize),
 DT_INIT_ARRAYSZ => init_array_size = Some(entry.d_un as usize),
 DT_PREINIT_ARRAY => preinit_array_off = Some(entry.d_un as usize),
 DT_PREINIT_ARRAYSZ => preinit_array_size = Some(entry.d_un as usize),
 DT_FINI_ARRAY => fini_array_off = Some(entry.d_un as usize),
 DT_FINI_ARRAYSZ => fini_array_size = Some(entry.d_un as usize),
 DT_FLAGS => got_flags = entry.d_un as i64,
 _ => {}
 }
 cur = unsafe { cur.add(1) };
 }
 let _ = got_flags;

 if let (Some(is_rela), Some(pltrel_is_rela)) = (is_rela, pltrel_is_rela) {
 if is_rela != pltrel_is_rela {
 return Err(parse_dynamic_error(
 "DT_REL/DT_RELA and DT_JMPREL disagree on relocation wire format"));
 }
 }
 if let Some(is_rela) = is_rela.or(pltrel_is_rela) {
 let expect_rela = size_of::<ElfRelType>() == size_of::<ElfRela>();
 let expect_rel = size_of::<ElfRelType>() == size_of::<ElfRel>();
 if (is_rela && !expect_rela) || (!is_rela && !expect_rel) {
 return Err(parse_dynamic_error(
 "guest relocation wire format does not match this build (rel/rela mismatch)"));
 }
 }

 let hashtab = match (gnu_hash_off, elf_hash_off) {
 (Some(off), _) => HashTab::Gnu(base + off),
 (None, Some(off)) => HashTab::Sysv(base + off),
 (None, None) => {
 return Err(parse_dynamic_error(
 "dynamic section has neither DT_GNU_HASH nor DT_HASH"));
 }
 };

 let symtab =
 base + symtab_off.ok_or_else(|| parse_dynamic_error("missing DT_SYMTAB"))?;
 let strtab =
 base + strtab_off.ok_or_else(|| parse_dynamic_error("missing DT_STRTAB"))?;

 let pltrel = pltrel_off.map(|off| unsafe {
 segments.get_slice::<ElfRelType>(off, pltrel_size.unwrap_or(0))
 });
 let dynrel =
 rel_off.map(|off| unsafe { segments.get_slice::<ElfRelType>(off, rel_size.unwrap_or(0)) });
 let relr =
 relr_off.map(|off| unsafe { segments.get_slice::<ElfRelr>(off, relr_size.unwrap_or(0)) });
 let init_array = init_array_off.map(|off| unsafe {
 segments.get_slice::<unsafe extern "C" fn()>(off, init_array_size.unwrap_or(0))
 });
 let preinit_array = preinit_array_off.map(|off| unsafe {
 segments.get_slice::<unsafe extern "C" fn()>(off, preinit_array_size.unwrap_or(0))
 });
 let fini_array = fini_array_off.map(|off| unsafe {
 segments.get_slice::<unsafe extern "C" fn()>(off, fini_array_size.unwrap_or(0))
 });

 Ok(ElfDynamic {
 dyn_ptr: dynamic_ptr,
 hashtab,
 symtab,
 strtab,
 got_plt: got_off.and_then(|off| NonNull::new((base + off) as *mut usize)),
 init_fn: init_off.map(|off| unsafe { std::mem::transmute(base + off) }),
 init_array,
 preinit_array,
 fini_fn: fini_off.map(|off| unsafe { std::mem::transmute(base + off) }),
 fini_array,
 pltrel,
 pltrel_is_rela,
 dynrel,
 relr,
 needed_libs,
 })
 }

 /// Builds a `.dynamic` extract describing an empty GNU hash table (one
 /// bucket, empty bloom filter) and empty symbol/string tables. The
 /// bloom filter rejects every query before any chain/symtab pointer is
 /// dereferenced, so this is sound to construct and query even though
 /// the tables behind it contain nothing.
 #[cfg(test)]
 pub(crate) fn empty_for_test() -> Self {
 static GNU_HASH: [u8; 32] = {
 let mut b = [0u8; 32];
 b[0] = 1; // nbucket = 1
 b[8] = 1; // maskwords = 1
 b
 };
 static STRTAB: [u8; 1] = [0];

 ElfDynamic {
 dyn_ptr: std::ptr::null_mut(),
 hashtab: HashTab::Gnu(GNU_HASH.as_ptr() as usize),
 symtab: GNU_HASH.as_ptr() as usize,
 strtab: STRTAB.as_ptr() as usize,
 got_plt: None,
 init_fn: None,
 init_array: None,
 preinit_array: None,
 fini_fn: None,
 fini_array: None,
 pltrel: None,
 pltrel_is_rela: None,
 dynrel: None,
 relr: None,
 needed_libs: Vec::new(),
 }
 }

 /// Rewrites `DT_DEBUG`'s payload to the process-wide debugger anchor
 /// address, matching the original loader's publish step.
 pub(crate) fn publish_debug_anchor(dynamic_ptr: *mut Dyn, anchor: usize) {
 let mut cur = dynamic_ptr;
 loop {
 let entry = unsafe { &mut *cur };
 match entry.d_tag as i64 {
 DT_NULL => break,
 DT_DEBUG => {
 entry.d_un = anchor as _;
 break;
 }
 _ => {}
 }
 cur = unsafe { cur.add(1) };
 }
 }
}
