//! Relocation engine (C5): the symbol-resolution pipeline (steps 1-8)
//! and per-architecture relocation application (REL/RELA/RELR).
use crate::arch::{ElfRelr, ElfRelType, RangeWidth, RelEntry, RelocAction, classify, rel_type_name};
use crate::error::{Result, relocate_error};
use crate::module::Module;
use crate::shim::{self, HostShims, NON_LOCAL_GOTO_SAVE_SYMBOL};
use crate::symbol::SymbolTable;

/// steps 1-6: resolves `name` to a host-visible address, trying (in
/// order) the `bionic_` shim, the intra-guest scope, plain host lookup, the
/// OpenGL extension path, the non-local-goto special case, and finally (if
/// enabled) a generated abort stub. Returns `Ok(None)` only when every step
/// came up empty — the caller decides whether that's tolerable (weak) or
/// fatal (non-weak), per step 7/8.
pub(crate) fn resolve_address(
 name: &str,
 is_function: bool,
 scope: &mut dyn FnMut(&str) -> Option<(usize, bool)>,
 shims: &dyn HostShims,
 runtime_stub_enabled: bool) -> Result<Option<usize>> {
 if let Some(addr) = shims.resolve_shim(name) {
 #[cfg(feature = "log")]
 log::trace!("resolved {name} via bionic_ shim");
 return Ok(Some(addr));
 }

 if let Some((addr, found_function)) = scope(name) {
 #[cfg(feature = "log")]
 log::trace!("resolved {name} intra-guest");
 return Ok(Some(if found_function { shim::wrap_function(addr) } else { addr }));
 }

 if let Some(addr) = shims.resolve_host(name) {
 #[cfg(feature = "log")]
 log::trace!("resolved {name} via host symbol table");
 return Ok(Some(addr));
 }

 if name.starts_with("gl") {
 if let Some(addr) = shims.resolve_gl(name) {
 #[cfg(feature = "log")]
 log::trace!("resolved {name} via EGL process address");
 return Ok(Some(addr));
 }
 }

 if name == NON_LOCAL_GOTO_SAVE_SYMBOL {
 if let Some(addr) = shims.resolve_setjmp_save() {
 return Ok(Some(addr));
 }
 }

 if runtime_stub_enabled && is_function {
 #[cfg(feature = "runtime-stub")]
 {
 #[cfg(feature = "log")]
 log::warn!("binding {name} to a die-at-runtime stub");
 return Ok(Some(crate::stub::install(name)?));
 }
 }

 Ok(None)
}

#[inline]
fn write_val(base: usize, offset: usize, val: usize) {
 unsafe { ((base + offset) as *mut usize).write_unaligned(val) };
}

fn write_ranged(base: usize, offset: usize, val: usize, width: RangeWidth) {
 let addr = base + offset;
 match width {
 RangeWidth::U32 => unsafe { (addr as *mut u32).write_unaligned(val as u32) },
 RangeWidth::U16 => unsafe { (addr as *mut u16).write_unaligned(val as u16) },
 RangeWidth::I32 => unsafe { (addr as *mut i32).write_unaligned(val as i32) },
 RangeWidth::I16 => unsafe { (addr as *mut i16).write_unaligned(val as i16) },
 }
}

/// Per-relocation-entry symbol context: name, weakness, and (for COPY) the
/// byte count to copy. `None` for relocation kinds that never reference a
/// symbol (`RELATIVE`, `NONE`).
struct SymRef<'a> {
 name: &'a str,
 is_weak: bool,
 is_function: bool,
 st_size: usize,
}

fn sym_ref<'a>(symtab: &'a SymbolTable, r_symbol: usize) -> Option<SymRef<'a>> {
 if r_symbol == 0 {
 return None;
 }
 let sym = symtab.symbol_at(r_symbol);
 Some(SymRef {
 name: symtab.name_at(r_symbol),
 is_weak: sym.is_weak(),
 is_function: sym.is_function(),
 st_size: sym.st_size(),
 })
}

#[allow(clippy::too_many_arguments)]
fn apply_one<R: RelEntry>(
 rel: &R,
 base: usize,
 symtab: &SymbolTable,
 scope: &mut dyn FnMut(&str) -> Option<(usize, bool)>,
 shims: &dyn HostShims,
 runtime_stub_enabled: bool) -> Result<()> {
 let r_type = rel.r_type();
 let action = classify(r_type);
 let offset = rel.r_offset();
 let addend = rel.addend(base);

 match action {
 RelocAction::None => Ok(()),

 RelocAction::Relative => {
 write_val(base, offset, base.wrapping_add_signed(addend));
 Ok(())
 }

 RelocAction::TlsModule | RelocAction::TlsOffset => {
 // Open Questions: acknowledged but never applied. A guest
 // shared library using `thread_local` storage has undefined
 // behavior under this loader.
 Ok(())
 }

 RelocAction::CopyRejected => Err(relocate_error(format!(
 "{}: COPY relocation rejected (this loader never loads executable-type guest objects)",
 rel_type_name(r_type)
))),

 RelocAction::Unknown => Err(relocate_error(format!(
 "unrecognized relocation type {r_type} for this architecture"
))),

 RelocAction::Copy => {
 let sref = sym_ref(symtab, rel.r_symbol())
.ok_or_else(|| relocate_error("COPY relocation with no symbol"))?;
 match resolve_address(sref.name, sref.is_function, scope, shims, runtime_stub_enabled)? {
 Some(addr) => {
 unsafe {
 std::ptr::copy_nonoverlapping(
 addr as *const u8,
 (base + offset) as *mut u8,
 sref.st_size);
 }
 Ok(())
 }
 None if sref.is_weak => Ok(()),
 None => Err(relocate_error(format!("symbol not found: {}", sref.name))),
 }
 }

 RelocAction::AssignSymbol | RelocAction::AddSymbol | RelocAction::AddSymbolRanged(_) => {
 let sref = sym_ref(symtab, rel.r_symbol())
.ok_or_else(|| relocate_error("symbol-referencing relocation with no symbol"))?;
 let resolved = resolve_address(sref.name, sref.is_function, scope, shims, runtime_stub_enabled)?;
 let value = match resolved {
 Some(addr) => (addr as isize).wrapping_add(addend) as usize,
 // step 8: absolute relocations default to zero when weak and unresolved.
 None if sref.is_weak => 0,
 None => return Err(relocate_error(format!("symbol not found: {}", sref.name))),
 };
 match action {
 RelocAction::AddSymbolRanged(width) => {
 if !width.fits(value) {
 return Err(relocate_error(format!(
 "relocation value {value:#x} for {} does not fit target field",
 sref.name
)));
 }
 write_ranged(base, offset, value, width);
 }
 _ => write_val(base, offset, value),
 }
 Ok(())
 }

 RelocAction::AddSymbolPcRelative | RelocAction::AddSymbolPcRelativeRanged(_) => {
 let sref = sym_ref(symtab, rel.r_symbol())
.ok_or_else(|| relocate_error("symbol-referencing relocation with no symbol"))?;
 let resolved = resolve_address(sref.name, sref.is_function, scope, shims, runtime_stub_enabled)?;
 let target_addr = base + offset;
 let value = match resolved {
 Some(addr) => (addr as isize)
.wrapping_add(addend)
.wrapping_sub(target_addr as isize) as usize,
 // step 8: PC-relative relocations default to a
 // self-reference (S := P), so S + A - P collapses to A.
 None if sref.is_weak => addend as usize,
 None => return Err(relocate_error(format!("symbol not found: {}", sref.name))),
 };
 match action {
 RelocAction::AddSymbolPcRelativeRanged(width) => {
 if !width.fits(value) {
 return Err(relocate_error(format!(
 "relocation value {value:#x} for {} does not fit target field",
 sref.name
)));
 }
 write_ranged(base, offset, value, width);
 }
 _ => write_val(base, offset, value),
 }
 Ok(())
 }
 }
}

/// Applies every relocation recorded against `module`'s dynamic section, in
/// the required order: PLT relocations first, then non-PLT, then RELR.
///
/// `scope` implements the intra-guest half of the symbol resolver's lookup
/// order (step 2 of the resolver pipeline); the caller builds it from the
/// registry since this module has no registry access of its own.
pub(crate) fn relocate_module(
 module: &Module,
 scope: &mut dyn FnMut(&str) -> Option<(usize, bool)>,
 shims: &dyn HostShims,
 runtime_stub_enabled: bool) -> Result<()> {
 let base = module.base();
 let symtab = &module.symtab;

 if let Some(pltrel) = module.dynamic.pltrel {
 apply_rel_slice(pltrel, base, symtab, scope, shims, runtime_stub_enabled)?;
 }
 if let Some(dynrel) = module.dynamic.dynrel {
 apply_rel_slice(dynrel, base, symtab, scope, shims, runtime_stub_enabled)?;
 }
 if let Some(relr) = module.dynamic.relr {
 apply_relr(relr, base);
 }
 Ok(())
}

fn apply_rel_slice(
 entries: &[ElfRelType],
 base: usize,
 symtab: &SymbolTable,
 scope: &mut dyn FnMut(&str) -> Option<(usize, bool)>,
 shims: &dyn HostShims,
 runtime_stub_enabled: bool) -> Result<()> {
 for rel in entries {
 apply_one(rel, base, symtab, scope, shims, runtime_stub_enabled)?;
 }
 Ok(())
}

/// RELR decoding: alternating even-encoded offsets and odd-encoded
/// bitmaps, each describing a run of `RELATIVE`-style relocations at one
/// machine word each.
fn apply_relr(entries: &[ElfRelr], load_base: usize) {
 const WORD: usize = size_of::<usize>();
 let bits = usize::BITS as usize;
 let mut base: usize = 0;

 for entry in entries {
 let e = entry.value();
 if e & 1 == 0 {
 apply_relative_at(e, load_base);
 base = e + WORD;
 } else {
 let mut bitmap = e;
 let mut i = 0usize;
 // bits 1..=(bits-1): bit 0 is the odd-encoding marker itself.
 bitmap >>= 1;
 while bitmap != 0 {
 if bitmap & 1 != 0 {
 apply_relative_at(base + i * WORD, load_base);
 }
 bitmap >>= 1;
 i += 1;
 }
 base += (bits - 1) * WORD;
 }
 }
}

#[inline]
fn apply_relative_at(offset: usize, load_base: usize) {
 if offset == 0 {
 return;
 }
 let ptr = (load_base + offset) as *mut usize;
 unsafe {
 let orig = ptr.read_unaligned();
 ptr.write_unaligned(load_base.wrapping_add(orig));
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn relr_even_entry_applies_one_relative_relocation() {
 let mut words = [0x1000usize, 0, 0, 0];
 let base = words.as_mut_ptr() as usize;
 // offset 8 (second word) relative to `base`.
 let entries = [ElfRelr::from_raw(8)];
 apply_relr(&entries, base);
 assert_eq!(words[1], base.wrapping_add(0));
 }

 #[test]
 fn relr_odd_entry_with_all_bits_set_applies_word_bits_minus_one_relocations() {
 const WORD: usize = size_of::<usize>();
 const N: usize = usize::BITS as usize; // bits-1 slots + 1 even anchor
 let mut words = [0usize; N];
 let base_ptr = words.as_mut_ptr() as usize;
 // all bits set, including the odd marker bit.
 let bitmap_entry: crate::arch::RawRelr = !0;
 let entries = [ElfRelr::from_raw(0), ElfRelr::from_raw(bitmap_entry)];
 let _ = WORD;
 apply_relr(&entries, base_ptr);
 // Every word covered by the bitmap after the anchor should now hold `base_ptr`.
 for w in words.iter().skip(1) {
 assert_eq!(*w, base_ptr);
 }
 }

 #[test]
 fn relr_zero_entry_applies_no_relocation() {
 let mut words = [0xDEADBEEFusize; 2];
 let base = words.as_mut_ptr() as usize;
 let entries = [ElfRelr::from_raw(0)];
 apply_relr(&entries, base);
 assert_eq!(words[0], 0xDEADBEEF);
 }
}
