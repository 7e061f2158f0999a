//! Lifecycle driver (C7) and the module-registry half of C6's open/close
//! path (-): name resolution, recursive `DT_NEEDED` linking,
//! constructor/destructor ordering, and registry/pool bookkeeping.
use crate::arch::Phdr;
use crate::config::OverrideMap;
use crate::context::{Context, Inner, LoaderConfig};
use crate::dynamic::ElfDynamic;
use crate::ehdr::{ElfHeader, compute_load_extent};
use crate::error::{Result, cannot_load, parse_phdr_error};
use crate::module::{Module, ModuleFlags, ModuleId};
use crate::object::{ElfFile, ElfObject};
use crate::path::{SearchPaths, strip_guest_prefix};
use crate::segment::load_segments;
use crate::shim::HostShims;
use crate::symbol::{SymbolTable, lookup_scope};
use std::ffi::CString;
use std::path::PathBuf;

/// steps 1-2: strip the guest system-lib prefix, then consult the
/// override map.
fn canonical_name<'a>(raw: &'a str, overrides: &'a OverrideMap) -> &'a str {
 overrides.resolve(strip_guest_prefix(raw))
}

/// step 4: first existing regular-file candidate on the search path.
fn find_on_disk(basename: &str, search_paths: &SearchPaths) -> Result<PathBuf> {
 search_paths
.candidates(basename)
.find(|p| p.is_file())
.ok_or_else(|| cannot_load(format!("{basename}: not found on search path")))
}

/// Reads the program-header table into a leaked, page-independent buffer.
/// Module records keep `phdrs` for their full (process) lifetime, matching
/// the pool's own "allocated once, never individually freed until process
/// exit" storage model.
fn read_phdrs(object: &mut dyn ElfObject, ehdr: &ElfHeader) -> Result<&'static [Phdr]> {
 let n = ehdr.e_phnum();
 if n == 0 {
 return Err(parse_phdr_error("no program headers"));
 }
 let mut storage: Vec<Phdr> = Vec::with_capacity(n);
 unsafe {
 let byte_len = n * size_of::<Phdr>();
 let byte_slice = std::slice::from_raw_parts_mut(storage.as_mut_ptr().cast::<u8>(), byte_len);
 object.read(byte_slice, ehdr.e_phoff())?;
 storage.set_len(n);
 }
 Ok(storage.leak())
}

fn find_dynamic_vaddr(phdrs: &[Phdr]) -> Option<usize> {
 phdrs
.iter()
.find(|p| p.p_type == elf::abi::PT_DYNAMIC)
.map(|p| p.p_vaddr as usize)
}

/// Maps, parses, and relocates one guest object, but does **not** run its
/// constructors or insert it into the registry — that's the caller's job,
/// so recursive `DT_NEEDED` resolution can build the full dependency graph
/// (and a bottom-up constructor order) before anything executes guest code.
fn load_one(
 name: &str,
 path: &PathBuf,
 inner: &mut Inner,
 shims: &dyn HostShims,
 config: &LoaderConfig,
 overrides: &OverrideMap,
 search_paths: &SearchPaths,
 ctor_order: &mut Vec<ModuleId>) -> Result<ModuleId> {
 let mut object = ElfFile::from_path(path)?;
 let file_len = object.len()?;

 let mut header_buf = vec![0u8; size_of::<crate::arch::Ehdr>()];
 object.read(&mut header_buf, 0)?;
 let ehdr = ElfHeader::parse(&header_buf)?;
 ehdr.validate()?;

 let phdrs = read_phdrs(&mut object, &ehdr)?;
 let extent = compute_load_extent(phdrs, file_len, &mut object)?;
 let mapped = load_segments(phdrs, &extent, &mut object)?;
 let base = mapped.segments.base();

 let dynamic_vaddr = find_dynamic_vaddr(phdrs)
.ok_or_else(|| cannot_load(format!("{name}: no PT_DYNAMIC segment")))?;
 let dynamic = ElfDynamic::parse((base + dynamic_vaddr) as *mut crate::arch::Dyn, &mapped.segments)?;
 let symtab = SymbolTable::from_dynamic(&dynamic);

 let needed_names: Vec<String> = dynamic
.needed_libs
.iter()
.map(|&off| {
 let cstr = unsafe { std::ffi::CStr::from_ptr((dynamic.strtab as *const u8).add(off).cast()) };
 cstr.to_string_lossy().into_owned()
 })
.collect();

 let mut module = Module {
 name: CString::new(name).unwrap_or_default(),
 path: path.clone(),
 segments: mapped.segments,
 phdrs,
 entry: ehdr.e_entry(),
 dynamic,
 symtab,
 relro: mapped.relro,
 write_protect: mapped.write_protect,
 flags: ModuleFlags::empty(),
 refcount: 0,
 ctors_called: false,
 needed: Vec::new(),
 };

 // step 5 (recursive half): resolve every DT_NEEDED dependency
 // before this module is inserted into the registry, so its own
 // `needed` side table is complete by the time anything can look it up.
 let mut needed_ids = Vec::with_capacity(needed_names.len());
 for dep_name in &needed_names {
 match open_internal(dep_name, inner, shims, config, overrides, search_paths, ctor_order) {
 Ok(id) => {
 if let Some(dep) = inner.pool.get_mut(id) {
 dep.refcount += 1;
 }
 needed_ids.push(Some(id));
 }
 Err(e) if config.tolerate_missing_needed => {
 #[cfg(feature = "log")]
 log::warn!("{name}: tolerating missing DT_NEEDED {dep_name}: {e}");
 needed_ids.push(None);
 }
 Err(e) => return Err(e),
 }
 }
 module.needed = needed_ids;

 let id = inner.pool.alloc(module)?;

 // Relocation needs the module and the registry simultaneously; build
 // the intra-guest scope closure against `inner` before reborrowing the
 // module itself.
 let relocate_result = {
 let inner_ptr: *const Inner = inner;
 let preload = inner.preload.clone();
 let main_exe = inner.main_exe;
 let mut scope = |sym: &str| -> Option<(usize, bool)> {
 // SAFETY: only ever reads `Inner` while relocation holds no
 // mutable borrow of it (relocation itself only writes through
 // raw pointers into the mapped guest image, never into module
 // records), so this shared read never aliases a live `&mut`.
 let inner = unsafe { &*inner_ptr };
 let target = inner.pool.get(id)?;
 lookup_scope(sym, target, &preload, &inner.pool, main_exe).map(|r| (r.addr, r.is_function))
 };
 let module_ref = inner.pool.get(id).expect("just allocated");
 crate::relocation::relocate_module(module_ref, &mut scope, shims, config.runtime_stub_enabled)
 };

 if let Err(e) = relocate_result {
 if let Some(m) = inner.pool.get_mut(id) {
 m.flags |= ModuleFlags::ERROR;
 }
 return Err(e);
 }

 if let Some(m) = inner.pool.get_mut(id) {
 m.write_protect.restore()?;
 if let Some(relro) = &m.relro {
 relro.protect()?;
 }
 m.flags |= ModuleFlags::LINKED;
 if dynamic_is_gnu_hash(&m.dynamic) {
 m.flags |= ModuleFlags::GNU_HASH;
 }
 }

 inner.registry.insert(name.to_string(), id);
 ctor_order.push(id);
 Ok(id)
}

fn dynamic_is_gnu_hash(dynamic: &ElfDynamic) -> bool {
 matches!(dynamic.hashtab, crate::dynamic::HashTab::Gnu(_))
}

/// steps 1-5, including the registry short-circuit: returns an
/// already-LINKED module's id unchanged, fails fast on an ERROR record
/// (never reused as a dependency target), and treats "found but neither"
/// as a `DT_NEEDED` cycle.
fn open_internal(
 raw_name: &str,
 inner: &mut Inner,
 shims: &dyn HostShims,
 config: &LoaderConfig,
 overrides: &OverrideMap,
 search_paths: &SearchPaths,
 ctor_order: &mut Vec<ModuleId>) -> Result<ModuleId> {
 let name = canonical_name(raw_name, overrides);

 if let Some(id) = inner.registry.by_name(name) {
 let module = inner
.pool
.get(id)
.ok_or_else(|| cannot_load(format!("{name}: stale registry entry")))?;
 if module.is_error() {
 return Err(cannot_load(format!("{name}: previously failed to load")));
 }
 if !module.is_linked() {
 return Err(cannot_load(format!("{name}: circular DT_NEEDED reference")));
 }
 return Ok(id);
 }

 let path = find_on_disk(name, search_paths)?;
 load_one(name, &path, inner, shims, config, overrides, search_paths, ctor_order)
}

/// Public entry point for C9's `open`: resolves `name` and every transitive
/// `DT_NEEDED` dependency, links them, then (with the registry lock
/// released, so a constructor is free to open further modules) runs
/// constructors bottom-up.
pub(crate) fn open(ctx: &Context, raw_name: &str) -> Result<ModuleId> {
 let (id, ctor_order) = {
 let mut inner = ctx.inner.lock().unwrap();
 let mut ctor_order = Vec::new();
 let id = open_internal(
 raw_name,
 &mut inner,
 ctx.shims.as_ref(),
 &ctx.config,
 &ctx.overrides,
 &ctx.search_paths,
 &mut ctor_order)?;
 if let Some(m) = inner.pool.get_mut(id) {
 m.refcount += 1;
 }
 (id, ctor_order)
 };

 for dep_id in &ctor_order {
 notify_and_construct(ctx, *dep_id);
 }

 Ok(id)
}

/// notification plus / constructor ordering for one module:
/// `DT_PREINIT_ARRAY`, then (already-recursed) dependencies, then
/// `DT_INIT`, then `DT_INIT_ARRAY`. The per-module latch is read and set
/// while the registry lock is held, then dropped before invoking anything
/// ("not held across user-supplied constructors").
fn notify_and_construct(ctx: &Context, id: ModuleId) {
 let name_and_base = {
 let inner = ctx.inner.lock().unwrap();
 inner.pool.get(id).map(|m| (m.short_name().to_string(), m.base()))
 };
 if let Some((name, base)) = name_and_base {
 let mut debug = ctx.debug.lock().unwrap();
 debug.notify_add(id, &name, base);
 }

 let already_called = {
 let mut inner = ctx.inner.lock().unwrap();
 match inner.pool.get_mut(id) {
 Some(m) if m.ctors_called => true,
 Some(m) => {
 m.ctors_called = true;
 false
 }
 None => return,
 }
 };
 if already_called {
 return;
 }

 let inner = ctx.inner.lock().unwrap();
 let Some(module) = inner.pool.get(id) else { return };
 let preinit = module.dynamic.preinit_array;
 let init_fn = module.dynamic.init_fn;
 let init_array = module.dynamic.init_array;
 drop(inner);

 if let Some(fns) = preinit {
 for f in fns {
 unsafe { f() };
 }
 }
 if let Some(f) = init_fn {
 unsafe { f() };
 }
 if let Some(fns) = init_array {
 for f in fns {
 unsafe { f() };
 }
 }
}

/// destructor ordering: `DT_FINI_ARRAY` in reverse, then `DT_FINI`.
fn run_destructors(ctx: &Context, id: ModuleId) {
 let inner = ctx.inner.lock().unwrap();
 let Some(module) = inner.pool.get(id) else { return };
 let fini_array = module.dynamic.fini_array;
 let fini_fn = module.dynamic.fini_fn;
 drop(inner);

 if let Some(fns) = fini_array {
 for f in fns.iter().rev() {
 unsafe { f() };
 }
 }
 if let Some(f) = fini_fn {
 unsafe { f() };
 }
}

/// "on last close": destructors, RELRO restored read-write (amended:
/// never — the side table means nothing needs clearing in the guest
/// image), dependency refcounts decremented and recursively unloaded at
/// zero, reservation unmapped (by `Module`'s own `Drop`).
pub(crate) fn close(ctx: &Context, id: ModuleId) -> Result<u32> {
 let remaining = {
 let mut inner = ctx.inner.lock().unwrap();
 let module = inner.pool.get_mut(id).ok_or_else(|| crate::error::Error::InvalidHandle)?;
 module.refcount = module.refcount.saturating_sub(1);
 module.refcount
 };

 if remaining > 0 {
 return Ok(remaining);
 }

 run_destructors(ctx, id);

 let (name, needed) = {
 let mut inner = ctx.inner.lock().unwrap();
 let module = inner.pool.get(id).ok_or_else(|| crate::error::Error::InvalidHandle)?;
 (module.short_name().to_string(), module.needed.clone())
 };

 {
 let mut debug = ctx.debug.lock().unwrap();
 debug.notify_remove(id);
 }

 {
 let mut inner = ctx.inner.lock().unwrap();
 inner.registry.remove(&name);
 inner.pool.free(id);
 }

 for dep in needed.into_iter().flatten() {
 let _ = close(ctx, dep);
 }

 Ok(0)
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn canonical_name_strips_prefix_then_overrides() {
 let mut map = OverrideMap::default();
 // Reach into the override map through its public `resolve` — no
 // `push_all`-equivalent is exposed outside `config.rs`, so this
 // only exercises the prefix-stripping half when no override exists.
 assert_eq!(canonical_name("/system/lib64/libc.so", &map), "libc.so");
 let _ = &mut map;
 }
}
