//! x86-64 guest relocation semantics (RELA wire format).
use crate::arch::RelocAction;
use elf::abi::*;

pub const EM_ARCH: u16 = EM_X86_64;
/// x86-64 guests always carry RELA entries.
pub const IS_RELA: bool = true;

pub(crate) fn classify(r_type: u32) -> RelocAction {
 match r_type {
 R_X86_64_NONE => RelocAction::None,
 R_X86_64_JUMP_SLOT => RelocAction::AssignSymbol,
 R_X86_64_GLOB_DAT => RelocAction::AssignSymbol,
 R_X86_64_64 => RelocAction::AddSymbol,
 R_X86_64_PC32 => RelocAction::AddSymbolPcRelative,
 R_X86_64_RELATIVE => RelocAction::Relative,
 R_X86_64_COPY => RelocAction::Copy,
 R_X86_64_DTPMOD64 => RelocAction::TlsModule,
 R_X86_64_DTPOFF64 | R_X86_64_TPOFF64 => RelocAction::TlsOffset,
 _ => RelocAction::Unknown,
 }
}

pub(crate) fn rel_type_name(r_type: u32) -> &'static str {
 match r_type {
 R_X86_64_NONE => "R_X86_64_NONE",
 R_X86_64_64 => "R_X86_64_64",
 R_X86_64_PC32 => "R_X86_64_PC32",
 R_X86_64_GLOB_DAT => "R_X86_64_GLOB_DAT",
 R_X86_64_JUMP_SLOT => "R_X86_64_JUMP_SLOT",
 R_X86_64_RELATIVE => "R_X86_64_RELATIVE",
 R_X86_64_COPY => "R_X86_64_COPY",
 R_X86_64_DTPMOD64 => "R_X86_64_DTPMOD64",
 R_X86_64_DTPOFF64 => "R_X86_64_DTPOFF64",
 R_X86_64_TPOFF64 => "R_X86_64_TPOFF64",
 _ => "UNKNOWN",
 }
}
