//! Translation-shim facade (C10): the `"bionic_" + name` lookup protocol
//! that lets host-native implementations win over same-named guest symbols,
//! plus the few name-insufficient special cases the relocation engine needs
//! (OpenGL extension dispatch, the non-local-goto save symbol).
use std::ffi::{CString, c_char, c_void};

/// The relocation engine substitutes this host implementation explicitly
/// (step 5): the guest's non-local-goto save routine captures register
/// state in a guest-ABI-shaped jump buffer the host's own `setjmp` does not
/// understand, so its name alone can't select the right implementation.
pub(crate) const NON_LOCAL_GOTO_SAVE_SYMBOL: &str = "setjmp";

/// Host-side symbol provider the relocation engine consults (steps
/// 1, 3, 4, 5). Addresses are returned as `usize` rather than raw pointers
/// so implementations can be `Send + Sync` and stored behind a shared
/// `Context`.
pub trait HostShims: Send + Sync {
 /// Step 1: `"bionic_" + original_name` in the host's own symbol table.
 fn resolve_shim(&self, original_name: &str) -> Option<usize>;

 /// Step 3: `original_name` verbatim in the host's symbol table.
 fn resolve_host(&self, original_name: &str) -> Option<usize>;

 /// Step 4: names beginning with `"gl"`, dispatched through the host's
 /// EGL process-address function. `None` if no such function was wired
 /// up by the embedder.
 fn resolve_gl(&self, original_name: &str) -> Option<usize>;

 /// Step 5: the non-local-goto save symbol (see
 /// [`NON_LOCAL_GOTO_SAVE_SYMBOL`]), wired to the guest-opaque wrapper
 /// layer's own implementation rather than the host's `setjmp`.
 fn resolve_setjmp_save(&self) -> Option<usize>;
}

/// `dlsym`-backed [`HostShims`]: the default any embedder gets unless they
/// supply their own. `"bionic_" + name` and plain `name` both go through
/// `RTLD_DEFAULT`, which is exactly how the host loader would resolve a
/// normal, same-ABI dependency.
pub struct DlsymShims {
 gl_resolver: Option<unsafe extern "C" fn(*const c_char) -> *const c_void>,
}

impl DlsymShims {
 pub fn new() -> Self {
 DlsymShims { gl_resolver: None }
 }

 /// Wires an `eglGetProcAddress`-shaped function for step 4. Embedders
 /// without a GL stack can leave this unset; `gl*` symbols then fall
 /// through to step 6/7 like any other unresolved symbol.
 pub fn with_gl_resolver(
 mut self,
 resolver: unsafe extern "C" fn(*const c_char) -> *const c_void) -> Self {
 self.gl_resolver = Some(resolver);
 self
 }

 fn dlsym(name: &str) -> Option<usize> {
 let cname = CString::new(name).ok?;
 let addr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, cname.as_ptr()) };
 if addr.is_null() { None } else { Some(addr as usize) }
 }
}

impl Default for DlsymShims {
 fn default() -> Self {
 Self::new()
 }
}

impl HostShims for DlsymShims {
 fn resolve_shim(&self, original_name: &str) -> Option<usize> {
 Self::dlsym(&format!("bionic_{original_name}"))
 }

 fn resolve_host(&self, original_name: &str) -> Option<usize> {
 Self::dlsym(original_name)
 }

 fn resolve_gl(&self, original_name: &str) -> Option<usize> {
 let resolver = self.gl_resolver?;
 let cname = CString::new(original_name).ok?;
 let addr = unsafe { resolver(cname.as_ptr()) };
 if addr.is_null() { None } else { Some(addr as usize) }
 }

 fn resolve_setjmp_save(&self) -> Option<usize> {
 Some(crate::wrappers::cleanup::guest_setjmp as usize)
 }
}

/// step 2 / "every returned function address passes through the
/// shim-wrapper identity function": today an identity pass, but the single
/// seam through which cross-ABI calling-convention repair would be added.
#[inline]
pub(crate) fn wrap_function(addr: usize) -> usize {
 addr
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn wrap_function_is_identity() {
 assert_eq!(wrap_function(0x1234), 0x1234);
 }

 #[test]
 fn dlsym_shim_finds_libc_symbol() {
 // `abort` is always present in any host libc and is never the name
 // of a bionic-prefixed shim, so this only exercises the plain path.
 assert!(DlsymShims::new().resolve_host("abort").is_some());
 }

 #[test]
 fn dlsym_shim_rejects_unknown_name() {
 assert!(
 DlsymShims::new()
.resolve_host("definitely_not_a_real_libc_symbol_xyz")
.is_none()
);
 }
}
