//! ELF32/ELF64 on-wire layouts and the per-architecture relocation tables.
//!
//! The guest and host always share a CPU architecture (this is an in-process
//! loader, not an emulator), so which relocation table applies is a
//! compile-time choice, exactly like the upstream loader this crate started
//! from.
use core::ops::{Deref, DerefMut};
use elf::abi::{
 SHN_UNDEF, STB_GLOBAL, STB_GNU_UNIQUE, STB_LOCAL, STB_WEAK, STT_COMMON, STT_FUNC,
 STT_GNU_IFUNC, STT_NOTYPE, STT_OBJECT, STT_TLS,
};

cfg_if::cfg_if! {
 if #[cfg(target_arch = "x86_64")] {
 mod x86_64;
 pub use x86_64::*;
 } else if #[cfg(target_arch = "aarch64")] {
 mod aarch64;
 pub use aarch64::*;
 } else if #[cfg(target_arch = "x86")] {
 mod x86;
 pub use x86::*;
 } else if #[cfg(target_arch = "arm")] {
 mod arm;
 pub use arm::*;
 } else {
 compile_error!("bionic_loader supports arm, aarch64, x86 and x86_64 guest/host pairs");
 }
}

cfg_if::cfg_if! {
 if #[cfg(target_pointer_width = "64")] {
 pub(crate) const E_CLASS: elf::file::Class = elf::file::Class::ELF64;
 pub(crate) type Phdr = elf::segment::Elf64_Phdr;
 pub type Dyn = elf::dynamic::Elf64_Dyn;
 pub(crate) type Ehdr = elf::file::Elf64_Ehdr;
 pub(crate) type RawRela = elf::relocation::Elf64_Rela;
 pub(crate) type RawRel = elf::relocation::Elf64_Rel;
 pub(crate) type RawRelr = u64;
 pub(crate) type RawSym = elf::symbol::Elf64_Sym;
 pub(crate) const REL_SYM_MASK: usize = 0xFFFF_FFFF;
 pub(crate) const REL_SYM_SHIFT: usize = 32;
 pub(crate) const EHDR_SIZE: usize = core::mem::size_of::<Ehdr>();
 } else {
 pub(crate) const E_CLASS: elf::file::Class = elf::file::Class::ELF32;
 pub(crate) type Phdr = elf::segment::Elf32_Phdr;
 pub type Dyn = elf::dynamic::Elf32_Dyn;
 pub(crate) type Ehdr = elf::file::Elf32_Ehdr;
 pub(crate) type RawRela = elf::relocation::Elf32_Rela;
 pub(crate) type RawRel = elf::relocation::Elf32_Rel;
 pub(crate) type RawRelr = u32;
 pub(crate) type RawSym = elf::symbol::Elf32_Sym;
 pub(crate) const REL_SYM_MASK: usize = 0xFF;
 pub(crate) const REL_SYM_SHIFT: usize = 8;
 pub(crate) const EHDR_SIZE: usize = core::mem::size_of::<Ehdr>();
 }
}

pub(crate) const PHDR_SIZE: usize = core::mem::size_of::<Phdr>();

/// `elf::abi` does not carry the RELR tags (added to the psABI after the
/// crate's constant table was generated), so these are hand-declared from
/// the generic ABI spec.
pub(crate) const DT_RELR: i64 = 36;
pub(crate) const DT_RELRSZ: i64 = 35;
pub(crate) const DT_RELRENT: i64 = 37;

/// Selects whether the PLT relocation table must be REL (32-bit guests) or
/// RELA (64-bit guests), matching the wire format this build was compiled
/// for.
#[cfg(not(feature = "rel"))]
pub type ElfRelType = ElfRela;
#[cfg(feature = "rel")]
pub type ElfRelType = ElfRel;

#[repr(transparent)]
pub struct ElfRela {
 raw: RawRela,
}

impl ElfRela {
 #[inline]
 pub fn r_type(&self) -> u32 {
 (self.raw.r_info as usize & REL_SYM_MASK) as u32
 }

 #[inline]
 pub fn r_symbol(&self) -> usize {
 self.raw.r_info as usize >> REL_SYM_SHIFT
 }

 #[inline]
 pub fn r_offset(&self) -> usize {
 self.raw.r_offset as usize
 }

 #[inline]
 pub fn r_addend(&self) -> isize {
 self.raw.r_addend as isize
 }
}

#[repr(transparent)]
pub struct ElfRel {
 raw: RawRel,
}

impl ElfRel {
 #[inline]
 pub fn r_type(&self) -> u32 {
 (self.raw.r_info as usize & REL_SYM_MASK) as u32
 }

 #[inline]
 pub fn r_symbol(&self) -> usize {
 self.raw.r_info as usize >> REL_SYM_SHIFT
 }

 #[inline]
 pub fn r_offset(&self) -> usize {
 self.raw.r_offset as usize
 }

 /// REL carries no explicit addend; says it is read from the target
 /// word at relocation time.
 #[inline]
 pub fn r_addend_from(&self, base: usize) -> isize {
 let ptr = (base + self.r_offset()) as *const isize;
 unsafe { ptr.read_unaligned() }
 }
}

/// Field width a range-checked relocation (AArch64 ABS32/ABS16/PREL32/PREL16)
/// must fit after the symbol+addend computation; violating it is a
/// relocation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangeWidth {
 U32,
 U16,
 I32,
 I16,
}

impl RangeWidth {
 pub(crate) fn fits(self, val: usize) -> bool {
 match self {
 RangeWidth::U32 => val <= u32::MAX as usize,
 RangeWidth::U16 => val <= u16::MAX as usize,
 RangeWidth::I32 => i32::try_from(val as isize).is_ok(),
 RangeWidth::I16 => i16::try_from(val as isize).is_ok(),
 }
 }

 pub(crate) fn byte_len(self) -> usize {
 match self {
 RangeWidth::U32 | RangeWidth::I32 => 4,
 RangeWidth::U16 | RangeWidth::I16 => 2,
 }
 }
}

/// The operation a relocation entry performs, independent of which psABI
/// (ARM/AArch64/i386/x86_64) or wire format (REL/RELA) produced it — the
/// relocation engine in `relocation.rs` is written once against this set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RelocAction {
 /// No-op (`R_*_NONE`).
 None,
 /// `target = S + A` where the default for an unresolved weak symbol is
 /// the load base (JUMP_SLOT, GLOB_DAT).
 AssignSymbol,
 /// `target = S + A`, default zero if weak and unresolved (ABS64/ABS32/32).
 AddSymbol,
 /// As `AddSymbol`, but the result must fit `RangeWidth` or relocation fails.
 AddSymbolRanged(RangeWidth),
 /// `target = S + A - P`, default self-reference (`S := P`) if weak and unresolved.
 AddSymbolPcRelative,
 /// As `AddSymbolPcRelative`, range-checked.
 AddSymbolPcRelativeRanged(RangeWidth),
 /// `target = B + A` (RELATIVE). Never references a symbol.
 Relative,
 /// Copies `st_size` bytes from the resolved symbol's storage (COPY).
 Copy,
 /// COPY relocations only make sense against the main executable's BSS;
 /// this loader never loads executable-type guest objects (AArch64).
 CopyRejected,
 /// TLS module-id relocation: acknowledged, never applied (Open Questions).
 TlsModule,
 /// TLS offset relocation: acknowledged, never applied (Open Questions).
 TlsOffset,
 /// Not a recognized relocation type for this architecture.
 Unknown,
}

/// Unifies `ElfRel`/`ElfRela` so the engine can iterate either wire format.
pub(crate) trait RelEntry {
 fn r_type(&self) -> u32;
 fn r_symbol(&self) -> usize;
 fn r_offset(&self) -> usize;
 /// `DT_RELA` carries an explicit addend; `DT_REL` has none, so it is
 /// read out of the target word (ARM note).
 fn addend(&self, base: usize) -> isize;
}

impl RelEntry for ElfRela {
 #[inline]
 fn r_type(&self) -> u32 {
 ElfRela::r_type(self)
 }
 #[inline]
 fn r_symbol(&self) -> usize {
 ElfRela::r_symbol(self)
 }
 #[inline]
 fn r_offset(&self) -> usize {
 ElfRela::r_offset(self)
 }
 #[inline]
 fn addend(&self, _base: usize) -> isize {
 self.r_addend()
 }
}

impl RelEntry for ElfRel {
 #[inline]
 fn r_type(&self) -> u32 {
 ElfRel::r_type(self)
 }
 #[inline]
 fn r_symbol(&self) -> usize {
 ElfRel::r_symbol(self)
 }
 #[inline]
 fn r_offset(&self) -> usize {
 ElfRel::r_offset(self)
 }
 #[inline]
 fn addend(&self, base: usize) -> isize {
 self.r_addend_from(base)
 }
}

#[repr(transparent)]
pub struct ElfRelr {
 raw: RawRelr,
}

impl ElfRelr {
 #[inline]
 pub fn value(&self) -> usize {
 self.raw as usize
 }

 #[cfg(test)]
 pub(crate) fn from_raw(raw: RawRelr) -> Self {
 ElfRelr { raw }
 }
}

#[repr(transparent)]
#[derive(Clone)]
pub struct ElfPhdr {
 phdr: Phdr,
}

impl Deref for ElfPhdr {
 type Target = Phdr;
 fn deref(&self) -> &Phdr {
 &self.phdr
 }
}

const OK_BINDS: usize = 1 << STB_GLOBAL | 1 << STB_WEAK | 1 << STB_GNU_UNIQUE;
const OK_TYPES: usize = 1 << STT_NOTYPE
 | 1 << STT_OBJECT
 | 1 << STT_FUNC
 | 1 << STT_COMMON
 | 1 << STT_TLS
 | 1 << STT_GNU_IFUNC;

#[repr(transparent)]
pub struct ElfSymbol {
 sym: RawSym,
}

impl ElfSymbol {
 #[inline]
 pub fn st_value(&self) -> usize {
 self.sym.st_value as usize
 }

 #[inline]
 pub fn st_bind(&self) -> u8 {
 self.sym.st_info >> 4
 }

 #[inline]
 pub fn st_type(&self) -> u8 {
 self.sym.st_info & 0xf
 }

 #[inline]
 pub fn st_shndx(&self) -> usize {
 self.sym.st_shndx as usize
 }

 #[inline]
 pub fn st_name(&self) -> usize {
 self.sym.st_name as usize
 }

 #[inline]
 pub fn st_size(&self) -> usize {
 self.sym.st_size as usize
 }

 #[inline]
 pub fn is_undef(&self) -> bool {
 self.st_shndx() == SHN_UNDEF as usize
 }

 #[inline]
 pub fn is_ok_bind(&self) -> bool {
 (1 << self.st_bind()) & OK_BINDS != 0
 }

 #[inline]
 pub fn is_ok_type(&self) -> bool {
 (1 << self.st_type()) & OK_TYPES != 0
 }

 #[inline]
 pub fn is_local(&self) -> bool {
 self.st_bind() == STB_LOCAL
 }

 #[inline]
 pub fn is_weak(&self) -> bool {
 self.st_bind() == STB_WEAK
 }

 #[inline]
 pub fn is_function(&self) -> bool {
 self.st_type() == STT_FUNC || self.st_type() == STT_GNU_IFUNC
 }
}

impl DerefMut for ElfPhdr {
 fn deref_mut(&mut self) -> &mut Phdr {
 &mut self.phdr
 }
}
