//! Process-wide linker state ("Global linker state"): the registry, pool,
//! path lists, override map, and debugger anchor grouped into one object,
//! initialized in the order the design notes specify (configuration first,
//! search paths second, registry third). Tests construct an isolated
//! instance instead of sharing process-global state.
use crate::config::{self, OverrideMap};
use crate::debug::{DebugLink, RDebug};
use crate::module::{DEFAULT_POOL_CAPACITY, ModuleId, Pool, Registry};
use crate::path::SearchPaths;
use crate::shim::{DlsymShims, HostShims};
use std::sync::Mutex;

/// Environment variables names, namespaced under `BIONIC_TRANSLATION_`
/// like the `bionic_translation/cfg.d` directory convention itself.
pub const ENV_LD_LIBRARY_PATH: &str = "BIONIC_TRANSLATION_LD_LIBRARY_PATH";
pub const ENV_HOST_DATA_DIRS: &str = "BIONIC_TRANSLATION_HOST_DATA_DIRS";
pub const ENV_DIE_AT_RUNTIME: &str = "BIONIC_TRANSLATION_DIE_AT_RUNTIME";

/// Process-wide, embedder-tunable behavior (amendment).
pub struct LoaderConfig {
 /// Whether a missing `DT_NEEDED` name binds its side-table slot to
 /// `None` (tolerated) instead of failing the load. Default `true`,
 /// matching the observed original behavior (Open Questions).
 pub tolerate_missing_needed: bool,
 /// step 6: bind unresolved function symbols to a generated
 /// die-at-runtime stub instead of failing the load.
 pub runtime_stub_enabled: bool,
 pub pool_capacity: usize,
}

impl LoaderConfig {
 /// Reads `runtime_stub_enabled` from [`ENV_DIE_AT_RUNTIME`] (set, any
 /// value, means enabled), everything else at its documented default.
 pub fn from_env() -> Self {
 LoaderConfig {
 tolerate_missing_needed: true,
 runtime_stub_enabled: std::env::var_os(ENV_DIE_AT_RUNTIME).is_some(),
 pool_capacity: DEFAULT_POOL_CAPACITY,
 }
 }
}

impl Default for LoaderConfig {
 fn default() -> Self {
 LoaderConfig {
 tolerate_missing_needed: true,
 runtime_stub_enabled: false,
 pool_capacity: DEFAULT_POOL_CAPACITY,
 }
 }
}

/// Registry, pool, and the two bookkeeping slots (`main_exe`, `preload`) the
/// lookup order in consults — everything the global lock in guards.
pub(crate) struct Inner {
 pub(crate) pool: Pool,
 pub(crate) registry: Registry,
 pub(crate) main_exe: Option<ModuleId>,
 pub(crate) preload: Vec<ModuleId>,
}

/// Process-wide (or, in tests, isolated) linker state. Holds two separate
/// locks per : `inner` guards C6-C9's shared state, `debug` guards C8's
/// list mutations, and they are never held across a user-supplied
/// constructor/destructor call.
pub struct Context {
 pub(crate) inner: Mutex<Inner>,
 pub(crate) debug: Mutex<DebugLink>,
 pub(crate) shims: Box<dyn HostShims>,
 pub(crate) config: LoaderConfig,
 pub(crate) overrides: OverrideMap,
 pub(crate) search_paths: SearchPaths,
}

impl Context {
 /// Full process-wide initialization: configuration first (environment
 /// scan + `cfg.d` load), search paths second, registry/pool third,
 /// matching the design notes' ordering. Uses a real `DT_DEBUG` anchor if
 /// the caller has one (usually discovered by the embedder's own
 /// bootstrap, which is out of this crate's scope).
 pub fn new(shims: Box<dyn HostShims>, config: LoaderConfig, debug_anchor: Option<*mut RDebug>) -> Self {
 let overrides = config::load_overrides(&config::host_data_dirs_from_env(ENV_HOST_DATA_DIRS));
 let mut search_paths = SearchPaths::new();
 search_paths.load_from_env_var(ENV_LD_LIBRARY_PATH);

 Context {
 inner: Mutex::new(Inner {
 pool: Pool::new(config.pool_capacity),
 registry: Registry::default(),
 main_exe: None,
 preload: Vec::new(),
 }),
 debug: Mutex::new(DebugLink::new(debug_anchor)),
 shims,
 config,
 overrides,
 search_paths,
 }
 }

 /// An isolated context for tests: no environment reads, no `cfg.d`
 /// scan, a synthetic debugger anchor, and the default `dlsym`-backed
 /// shim provider.
 pub fn isolated() -> Self {
 Context {
 inner: Mutex::new(Inner {
 pool: Pool::new(DEFAULT_POOL_CAPACITY),
 registry: Registry::default(),
 main_exe: None,
 preload: Vec::new(),
 }),
 debug: Mutex::new(DebugLink::new(None)),
 shims: Box::new(DlsymShims::new()),
 config: LoaderConfig::default(),
 overrides: OverrideMap::default(),
 search_paths: SearchPaths::new(),
 }
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn isolated_context_starts_with_empty_registry() {
 let ctx = Context::isolated();
 let inner = ctx.inner.lock().unwrap();
 assert!(inner.registry.iter_order().next().is_none());
 }
}
