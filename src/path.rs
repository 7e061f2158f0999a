//! Path resolver (C12): library-name override map consumer, search-path
//! list, and disk candidate search (step 4, "Search-path list").
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Guest system-library path prefixes stripped before override/registry
/// lookup (step 1). The guest is a bionic-ABI object, so its own idea
/// of "system lib dir" never exists on the host filesystem.
const GUEST_SYSTEM_LIB_PREFIXES: &[&str] = &["/system/lib64/", "/system/lib/", "/vendor/lib64/", "/vendor/lib/"];

/// Built-in directories searched after the environment-provided path list,
/// matching the guest's own default library locations.
#[cfg(target_pointer_width = "64")]
const BUILTIN_DIRS: &[&str] = &["/system/lib64", "/vendor/lib64"];
#[cfg(target_pointer_width = "32")]
const BUILTIN_DIRS: &[&str] = &["/system/lib", "/vendor/lib"];

/// step 1: strip a known guest system-library path prefix, if present,
/// leaving just the basename-bearing suffix for override/registry lookup.
pub(crate) fn strip_guest_prefix(name: &str) -> &str {
 for prefix in GUEST_SYSTEM_LIB_PREFIXES {
 if let Some(rest) = name.strip_prefix(prefix) {
 return rest;
 }
 }
 name
}

/// Two vectors ("Search-path list"): one from the guest-loader search-path
/// environment variable, one from built-in defaults. Entries are normalized
/// through `canonicalize` where possible so later equality checks (e.g. "is
/// this directory already in the list") compare real paths, not aliases.
pub(crate) struct SearchPaths {
 env: Vec<PathBuf>,
 builtin: Vec<PathBuf>,
}

impl SearchPaths {
 pub(crate) fn new() -> Self {
 SearchPaths {
 env: Vec::new(),
 builtin: BUILTIN_DIRS.iter().map(PathBuf::from).collect(),
 }
 }

 /// Populates the environment vector from a colon-separated directory
 /// list ("guest-loader search path").
 pub(crate) fn load_from_env_var(&mut self, var_name: &str) {
 self.env = std::env::var_os(var_name)
.map(|val| split_colon_list(&val))
.unwrap_or_default();
 }

 /// Candidate full paths for `basename`, env directories first, then
 /// built-ins (step 4).
 pub(crate) fn candidates<'a>(&'a self, basename: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
 self.env
.iter()
.chain(self.builtin.iter())
.map(move |dir| dir.join(basename))
 }
}

impl Default for SearchPaths {
 fn default() -> Self {
 Self::new()
 }
}

/// Splits a colon-separated environment value into normalized directory
/// paths, dropping empty segments (as a bare `::` or leading/trailing `:`
/// would otherwise yield an empty, meaningless entry).
pub(crate) fn split_colon_list(val: &OsStr) -> Vec<PathBuf> {
 val.to_string_lossy()
.split(':')
.filter(|s| !s.is_empty())
.map(|s| realpath_or_self(Path::new(s)))
.collect()
}

fn realpath_or_self(p: &Path) -> PathBuf {
 std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn strips_known_guest_prefix() {
 assert_eq!(strip_guest_prefix("/system/lib64/libc.so"), "libc.so");
 assert_eq!(strip_guest_prefix("/vendor/lib/libfoo.so"), "libfoo.so");
 assert_eq!(strip_guest_prefix("libc.so"), "libc.so");
 }

 #[test]
 fn split_colon_list_drops_empty_segments() {
 let paths = split_colon_list(OsStr::new("/a/b::/c/d:"));
 assert_eq!(paths.len(), 2);
 assert!(paths[0].ends_with("a/b") || paths[0].to_string_lossy().contains("a/b"));
 }

 #[test]
 fn candidates_orders_env_before_builtin() {
 let mut sp = SearchPaths::new();
 sp.env = vec![PathBuf::from("/custom/lib")];
 let got: Vec<_> = sp.candidates("libfoo.so").collect();
 assert_eq!(got[0], PathBuf::from("/custom/lib/libfoo.so"));
 assert!(got.len() > 1);
 }
}
