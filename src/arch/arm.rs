//! ARM (32-bit) guest relocation semantics (REL wire format —
//! ARM carries no explicit addend field, so `ElfRel::r_addend_from` reads it
//! out of the target word).
use crate::arch::RelocAction;
use elf::abi::*;

pub const EM_ARCH: u16 = EM_ARM;
pub const IS_RELA: bool = false;

pub(crate) fn classify(r_type: u32) -> RelocAction {
 match r_type {
 R_ARM_NONE => RelocAction::None,
 R_ARM_JUMP_SLOT => RelocAction::AssignSymbol,
 R_ARM_GLOB_DAT => RelocAction::AssignSymbol,
 R_ARM_ABS32 => RelocAction::AddSymbol,
 R_ARM_REL32 => RelocAction::AddSymbolPcRelative,
 R_ARM_RELATIVE => RelocAction::Relative,
 R_ARM_COPY => RelocAction::Copy,
 _ => RelocAction::Unknown,
 }
}

pub(crate) fn rel_type_name(r_type: u32) -> &'static str {
 match r_type {
 R_ARM_NONE => "R_ARM_NONE",
 R_ARM_ABS32 => "R_ARM_ABS32",
 R_ARM_REL32 => "R_ARM_REL32",
 R_ARM_GLOB_DAT => "R_ARM_GLOB_DAT",
 R_ARM_JUMP_SLOT => "R_ARM_JUMP_SLOT",
 R_ARM_RELATIVE => "R_ARM_RELATIVE",
 R_ARM_COPY => "R_ARM_COPY",
 _ => "UNKNOWN",
 }
}
