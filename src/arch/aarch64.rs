//! AArch64 guest relocation semantics (RELA wire format).
//!
//! ABS32/ABS16/PREL{64,32,16} additionally require a range check against the
//! target field's signed/unsigned domain; the engine performs that check
//! generically once it knows the field width via [`RelocAction`].
use crate::arch::{RangeWidth, RelocAction};
use elf::abi::*;

pub const EM_ARCH: u16 = EM_AARCH64;
pub const IS_RELA: bool = true;

pub(crate) fn classify(r_type: u32) -> RelocAction {
 match r_type {
 R_AARCH64_NONE => RelocAction::None,
 R_AARCH64_JUMP_SLOT => RelocAction::AssignSymbol,
 R_AARCH64_GLOB_DAT => RelocAction::AssignSymbol,
 R_AARCH64_ABS64 => RelocAction::AddSymbol,
 R_AARCH64_ABS32 => RelocAction::AddSymbolRanged(RangeWidth::U32),
 R_AARCH64_ABS16 => RelocAction::AddSymbolRanged(RangeWidth::U16),
 R_AARCH64_PREL64 => RelocAction::AddSymbolPcRelative,
 R_AARCH64_PREL32 => RelocAction::AddSymbolPcRelativeRanged(RangeWidth::I32),
 R_AARCH64_PREL16 => RelocAction::AddSymbolPcRelativeRanged(RangeWidth::I16),
 R_AARCH64_RELATIVE => RelocAction::Relative,
 // COPY is rejected outright: this loader never loads executable-type
 // guest objects, so a COPY relocation (which only makes sense against
 // the main executable's BSS) is always an error.
 R_AARCH64_COPY => RelocAction::CopyRejected,
 R_AARCH64_TLS_DTPMOD => RelocAction::TlsModule,
 R_AARCH64_TLS_DTPREL | R_AARCH64_TLS_TPREL => RelocAction::TlsOffset,
 _ => RelocAction::Unknown,
 }
}

pub(crate) fn rel_type_name(r_type: u32) -> &'static str {
 match r_type {
 R_AARCH64_NONE => "R_AARCH64_NONE",
 R_AARCH64_ABS64 => "R_AARCH64_ABS64",
 R_AARCH64_ABS32 => "R_AARCH64_ABS32",
 R_AARCH64_ABS16 => "R_AARCH64_ABS16",
 R_AARCH64_PREL64 => "R_AARCH64_PREL64",
 R_AARCH64_PREL32 => "R_AARCH64_PREL32",
 R_AARCH64_PREL16 => "R_AARCH64_PREL16",
 R_AARCH64_GLOB_DAT => "R_AARCH64_GLOB_DAT",
 R_AARCH64_JUMP_SLOT => "R_AARCH64_JUMP_SLOT",
 R_AARCH64_RELATIVE => "R_AARCH64_RELATIVE",
 R_AARCH64_COPY => "R_AARCH64_COPY",
 R_AARCH64_TLS_DTPMOD => "R_AARCH64_TLS_DTPMOD",
 R_AARCH64_TLS_DTPREL => "R_AARCH64_TLS_DTPREL",
 R_AARCH64_TLS_TPREL => "R_AARCH64_TLS_TPREL",
 _ => "UNKNOWN",
 }
}
