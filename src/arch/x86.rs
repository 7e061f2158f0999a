//! i386 guest relocation semantics (REL wire format).
use crate::arch::RelocAction;
use elf::abi::*;

pub const EM_ARCH: u16 = EM_386;
pub const IS_RELA: bool = false;

pub(crate) fn classify(r_type: u32) -> RelocAction {
 match r_type {
 R_386_NONE => RelocAction::None,
 R_386_JMP_SLOT => RelocAction::AssignSymbol,
 R_386_GLOB_DAT => RelocAction::AssignSymbol,
 R_386_32 => RelocAction::AddSymbol,
 R_386_PC32 => RelocAction::AddSymbolPcRelative,
 R_386_RELATIVE => RelocAction::Relative,
 R_386_COPY => RelocAction::Copy,
 R_386_TLS_DTPMOD32 => RelocAction::TlsModule,
 R_386_TLS_DTPOFF32 | R_386_TLS_TPOFF => RelocAction::TlsOffset,
 _ => RelocAction::Unknown,
 }
}

pub(crate) fn rel_type_name(r_type: u32) -> &'static str {
 match r_type {
 R_386_NONE => "R_386_NONE",
 R_386_32 => "R_386_32",
 R_386_PC32 => "R_386_PC32",
 R_386_GLOB_DAT => "R_386_GLOB_DAT",
 R_386_JMP_SLOT => "R_386_JMP_SLOT",
 R_386_RELATIVE => "R_386_RELATIVE",
 R_386_COPY => "R_386_COPY",
 R_386_TLS_DTPMOD32 => "R_386_TLS_DTPMOD32",
 R_386_TLS_DTPOFF32 => "R_386_TLS_DTPOFF32",
 R_386_TLS_TPOFF => "R_386_TLS_TPOFF",
 _ => "UNKNOWN",
 }
}
