//! Symbol table view over a module's dynamic-section extracts: wraps the
//! string table, symbol table, and whichever hash table (prefers GNU)
//! the module carries, and implements module-local lookup.
use crate::arch::ElfSymbol;
use crate::dynamic::{ElfDynamic, HashTab};
use crate::hash::{GnuHash, SymbolQuery, SysvHash};
use crate::module::{Module, ModuleId, Pool, Registry};
use std::ffi::CStr;

struct GnuHashHeader {
 nbucket: u32,
 symbias: u32,
 maskwords: u32,
 shift: u32,
}

enum ParsedHash {
 Gnu {
 header: GnuHashHeader,
 bloom: *const usize,
 buckets: *const u32,
 chains: *const u32,
 },
 Sysv {
 nbucket: u32,
 buckets: *const u32,
 chains: *const u32,
 },
}

/// One module's `.dynsym`/`.dynstr`/hash-table triple, rebased to absolute
/// addresses.
pub(crate) struct SymbolTable {
 hash: ParsedHash,
 symtab: *const ElfSymbol,
 strtab: *const u8,
}

impl SymbolTable {
 pub(crate) fn from_dynamic(dynamic: &ElfDynamic) -> Self {
 let hash = match dynamic.hashtab {
 HashTab::Gnu(addr) => {
 const HDR: usize = 16; // four u32 fields
 let ptr = addr as *const u8;
 let nbucket = unsafe { (ptr as *const u32).read_unaligned() };
 let symbias = unsafe { (ptr as *const u32).add(1).read_unaligned() };
 let maskwords = unsafe { (ptr as *const u32).add(2).read_unaligned() };
 let shift = unsafe { (ptr as *const u32).add(3).read_unaligned() };
 debug_assert!(maskwords.is_power_of_two());
 let bloom = unsafe { ptr.add(HDR) } as *const usize;
 let buckets = unsafe { (bloom as *const u8).add(maskwords as usize * size_of::<usize>()) } as *const u32;
 let chains = unsafe { buckets.add(nbucket as usize) };
 ParsedHash::Gnu {
 header: GnuHashHeader { nbucket, symbias, maskwords, shift },
 bloom,
 buckets,
 chains,
 }
 }
 HashTab::Sysv(addr) => {
 let ptr = addr as *const u32;
 let nbucket = unsafe { ptr.read() };
 let buckets = unsafe { ptr.add(2) };
 let chains = unsafe { buckets.add(nbucket as usize) };
 ParsedHash::Sysv { nbucket, buckets, chains }
 }
 };
 SymbolTable {
 hash,
 symtab: dynamic.symtab as *const ElfSymbol,
 strtab: dynamic.strtab as *const u8,
 }
 }

 #[inline]
 pub(crate) fn get_str(&self, offset: usize) -> &'static str {
 unsafe {
 let cstr = CStr::from_ptr(self.strtab.add(offset).cast());
 std::str::from_utf8_unchecked(cstr.to_bytes())
 }
 }

 #[inline]
 pub(crate) fn symbol_at(&self, idx: usize) -> &'static ElfSymbol {
 unsafe { &*self.symtab.add(idx) }
 }

 pub(crate) fn name_at(&self, idx: usize) -> &'static str {
 self.get_str(self.symbol_at(idx).st_name())
 }

 /// Module-local lookup : whichever hash table this module
 /// carries, returning the matching symbol's index.
 pub(crate) fn lookup_local(&self, query: &mut SymbolQuery) -> Option<usize> {
 let strtab_get = |off: usize| self.get_str(off);
 match &self.hash {
 ParsedHash::Gnu { header, bloom, buckets, chains } => GnuHash::lookup(
 query.gnu_hash(),
 header.nbucket as usize,
 header.symbias as usize,
 header.maskwords as usize,
 header.shift,
 *bloom,
 *buckets,
 *chains,
 self.symtab,
 strtab_get,
 query.name()),
 ParsedHash::Sysv { nbucket, buckets, chains } => SysvHash::lookup(
 query.sysv_hash(),
 *nbucket as usize,
 *buckets,
 *chains,
 self.symtab,
 strtab_get,
 query.name()),
 }
 }

 /// address-to-symbol lookup: linear scan for the first symbol
 /// whose `[st_value, st_value+st_size)` (rebased by `base`) contains
 /// `addr`. Requires a symbol count, which isn't directly recorded for
 /// GNU hash tables, so the caller supplies an upper bound (the module's
 /// `.dynsym` size is not tracked either — this is inherently a "best
 /// effort up to `count`" scan matching the upstream loader's behavior).
 pub(crate) fn addr_to_symbol(&self, base: usize, addr: usize, count: usize) -> Option<(usize, &'static ElfSymbol)> {
 for idx in 0..count {
 let sym = self.symbol_at(idx);
 if sym.is_undef() || sym.st_size() == 0 {
 continue;
 }
 let start = base + sym.st_value();
 let end = start + sym.st_size();
 if (start..end).contains(&addr) {
 return Some((idx, sym));
 }
 }
 None
 }
}

/// A symbol address plus whether the matched definition is a function
/// (the relocation engine only routes functions through the C10
/// wrapper-create seam, per step 2).
pub(crate) struct Resolved {
 pub(crate) addr: usize,
 pub(crate) is_function: bool,
}

fn lookup_one(id: ModuleId, pool: &Pool, query: &mut SymbolQuery) -> Option<Resolved> {
 let module = pool.get(id)?;
 let idx = module.symtab.lookup_local(query)?;
 let sym = module.symtab.symbol_at(idx);
 Some(Resolved {
 addr: module.base() + sym.st_value(),
 is_function: sym.is_function(),
 })
}

/// "Lookup order from inside a relocating module M": M itself, the
/// preload list, each `DT_NEEDED` dependency in declaration order, then the
/// main executable's module record. First match wins.
pub(crate) fn lookup_scope(
 name: &str,
 target: &Module,
 preload: &[ModuleId],
 pool: &Pool,
 main_exe: Option<ModuleId>) -> Option<Resolved> {
 let mut query = SymbolQuery::new(name);

 if let Some(idx) = target.symtab.lookup_local(&mut query) {
 let sym = target.symtab.symbol_at(idx);
 return Some(Resolved {
 addr: target.base() + sym.st_value(),
 is_function: sym.is_function(),
 });
 }

 for &id in preload {
 if let Some(r) = lookup_one(id, pool, &mut query) {
 return Some(r);
 }
 }

 for dep in &target.needed {
 if let Some(id) = dep {
 if let Some(r) = lookup_one(*id, pool, &mut query) {
 return Some(r);
 }
 }
 }

 if let Some(id) = main_exe {
 if let Some(r) = lookup_one(id, pool, &mut query) {
 return Some(r);
 }
 }

 None
}

/// Global lookup for `RTLD_DEFAULT`-style requests : iterates the
/// registry in insertion order, skipping modules in the ERROR state, and
/// reports the containing module alongside the symbol.
pub(crate) fn lookup_global(
 name: &str,
 pool: &Pool,
 registry: &Registry) -> Option<(ModuleId, Resolved)> {
 let mut query = SymbolQuery::new(name);
 for id in registry.iter_order() {
 let module = pool.get(id)?;
 if module.is_error() {
 continue;
 }
 if let Some(idx) = module.symtab.lookup_local(&mut query) {
 let sym = module.symtab.symbol_at(idx);
 return Some((
 id,
 Resolved {
 addr: module.base() + sym.st_value(),
 is_function: sym.is_function(),
 }));
 }
 }
 None
}

#[cfg(test)]
mod tests {
 use super::*;
 use crate::module::tests_support::stub;

 #[test]
 fn lookup_scope_prefers_target_over_dependencies() {
 // Both `target` and its sole dependency carry empty (always-miss)
 // hash tables, so this only exercises the "not found anywhere"
 // path, but confirms the scope order doesn't panic on a module with
 // no preload/needed/main-exe entries.
 let mut pool = Pool::new(2);
 let dep_id = pool.alloc(stub("dep")).unwrap();
 let target = stub("target");
 assert!(lookup_scope("anything", &target, &[], &pool, Some(dep_id)).is_none());
 }
}
