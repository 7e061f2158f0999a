//! Public dynamic-linking API (C9): `open`/`close`/`lookup`/`addr_info`,
//! each serialized through the context's global lock for its duration,
//! plus the latched error-message API.
use crate::context::Context;
use crate::error::{Error, Result};
use crate::hash::SymbolQuery;
use crate::lifecycle;
use crate::module::ModuleId;
use crate::symbol::lookup_global;
use std::cell::RefCell;

/// flags argument; today only distinguishes deferred vs. immediate
/// binding for API compatibility (this loader is always eager, per
/// Non-goals), so both variants behave identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenFlags {
 Lazy,
 Now,
}

/// A resolved reference to something `lookup` can search: a specific
/// module, or one of the two `RTLD_*`-style wildcard scopes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handle {
 Module(ModuleId),
 /// `RTLD_DEFAULT`: every linked module, registry order, first match.
 Default,
 /// `RTLD_NEXT`: every linked module *after* the one containing
 /// `caller_addr`, registry order.
 Next { caller_addr: usize },
}

thread_local! {
 static LAST_ERROR: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn latch(err: Error) -> Error {
 LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.to_string()));
 err
}

/// `error`: the latched message, clearing it — matching the
/// standard dynamic-linking error idiom.
pub fn error() -> Option<String> {
 LAST_ERROR.with(|slot| slot.borrow_mut().take())
}

/// `open`: resolves `name` (and its transitive `DT_NEEDED` graph),
/// links it, runs constructors, and returns a handle. `flags` is accepted
/// for API compatibility but does not change behavior (see [`OpenFlags`]).
pub fn open(ctx: &Context, name: &str, _flags: OpenFlags) -> Result<Handle> {
 lifecycle::open(ctx, name).map(Handle::Module).map_err(latch)
}

/// `close`: decrements refcount, unloading (and recursively
/// decrementing dependencies) on last close. Returns the refcount after
/// the decrement.
pub fn close(ctx: &Context, handle: Handle) -> Result<u32> {
 let Handle::Module(id) = handle else {
 return Err(latch(Error::InvalidHandle));
 };
 lifecycle::close(ctx, id).map_err(latch)
}

/// Finds the module whose mapped extent contains `addr`, given an
/// already-locked [`Inner`]. Shared by the `RTLD_NEXT` lookup arm and
/// `addr_info`, neither of which may take a second, nested lock on the
/// same mutex.
fn addr_owner(inner: &crate::context::Inner, addr: usize) -> Option<ModuleId> {
 inner.registry.iter_order().find(|&id| {
 inner
.pool
.get(id)
.map(|m| {
 let base = m.base();
 (base..base + m.segments.len()).contains(&addr)
 })
.unwrap_or(false)
 })
}

/// `lookup`: search order depends on the handle kind, per [`Handle`]'s
/// variant docs above. Every returned address passes through C10's
/// `wrap_function` identity seam.
pub fn lookup(ctx: &Context, handle: Handle, symbol: &str) -> Result<usize> {
 if symbol.is_empty() {
 return Err(latch(Error::BadSymbolName));
 }

 let result: Result<usize> = (|| match handle {
 Handle::Module(id) => {
 let inner = ctx.inner.lock().unwrap();
 let module = inner.pool.get(id).ok_or(Error::InvalidHandle)?;
 let mut query = SymbolQuery::new(symbol);
 let idx = module
.symtab
.lookup_local(&mut query)
.ok_or_else(|| Error::SymbolNotFound { name: symbol.to_string().into() })?;
 let sym = module.symtab.symbol_at(idx);
 Ok(crate::shim::wrap_function(module.base() + sym.st_value()))
 }

 Handle::Default => {
 let inner = ctx.inner.lock().unwrap();
 let (_, resolved) = lookup_global(symbol, &inner.pool, &inner.registry)
.ok_or_else(|| Error::SymbolNotFound { name: symbol.to_string().into() })?;
 Ok(crate::shim::wrap_function(resolved.addr))
 }

 Handle::Next { caller_addr } => {
 let inner = ctx.inner.lock().unwrap();
 let caller = addr_owner(&inner, caller_addr);
 let mut query = SymbolQuery::new(symbol);
 let mut past_caller = caller.is_none();
 for id in inner.registry.iter_order() {
 if !past_caller {
 if Some(id) == caller {
 past_caller = true;
 }
 continue;
 }
 if let Some(module) = inner.pool.get(id) {
 if module.is_error() {
 continue;
 }
 if let Some(idx) = module.symtab.lookup_local(&mut query) {
 let sym = module.symtab.symbol_at(idx);
 return Ok(crate::shim::wrap_function(module.base() + sym.st_value()));
 }
 }
 }
 Err(Error::SymbolNotFound { name: symbol.to_string().into() })
 }
 });

 result.map_err(latch)
}

/// `addr_info`: the owning module's short name, plus the nearest
/// symbol covering `address`, if any.
pub fn addr_info(ctx: &Context, address: usize) -> Option<(String, Option<String>)> {
 let inner = ctx.inner.lock().unwrap();
 let id = addr_owner(&inner, address)?;
 let module = inner.pool.get(id)?;
 // `addr_to_symbol`'s upper bound: this loader does not track a dynamic
 // symbol count separately, so it scans a generous fixed ceiling the
 // same way the module-local hash lookup implicitly bounds chain walks.
 const SCAN_CEILING: usize = 1 << 16;
 let sym_name = module
.symtab
.addr_to_symbol(module.base(), address, SCAN_CEILING)
.map(|(idx, _)| module.symtab.name_at(idx).to_string());
 Some((module.short_name().to_string(), sym_name))
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn error_latch_is_empty_until_something_fails() {
 let _ = error(); // drain anything a previous test in this thread left behind
 assert!(error().is_none());
 }

 #[test]
 fn lookup_on_invalid_handle_latches_and_returns_error() {
 let ctx = Context::isolated();
 let bogus = lifecycle_test_handle();
 let result = lookup(&ctx, bogus, "whatever");
 assert!(result.is_err());
 assert!(error().is_some());
 }

 fn lifecycle_test_handle() -> Handle {
 let mut pool = crate::module::Pool::new(1);
 let id = pool.alloc(crate::module::tests_support::stub("x")).unwrap();
 pool.free(id);
 Handle::Module(id)
 }
}
