//! Library-override map and its `cfg.d` configuration-file loader.
//!
//! Grounded on `original_source/linker/config.c`'s `read_cfg_file` /
//! `process_cfg_line`: scan each host-data-dir's `bionic_translation/cfg.d`
//! subdirectory (plus a fixed system directory) for `from to` lines.
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Fixed system configuration directory consulted in addition to the
/// per-embedder host-data directories.
const SYSTEM_CFG_DIR: &str = "/etc/bionic_translation/cfg.d";

/// Ordered list of `(from, to)` pairs. First match wins, matching
/// `open`'s single override-map pass.
#[derive(Default, Clone)]
pub(crate) struct OverrideMap {
 pairs: Vec<(String, String)>,
}

impl OverrideMap {
 pub(crate) fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
 self.pairs
.iter()
.find(|(from, _)| from == name)
.map(|(_, to)| to.as_str())
.unwrap_or(name)
 }

 fn push_all(&mut self, mut other: Vec<(String, String)>) {
 self.pairs.append(&mut other);
 }
}

/// Walks every `<dir>/bionic_translation/cfg.d` directory (plus
/// [`SYSTEM_CFG_DIR`]) and parses every regular file found there.
///
/// A directory that doesn't exist is silently skipped (`opendir` returning
/// `NULL` is not an error in the original). A file that exists but cannot be
/// read, or that contains a malformed line, aborts the process with a
/// diagnostic naming the file and line — this mirrors `process_cfg_line`'s
/// `fprintf` + `exit(1)`, which is why this function never returns an
/// `Err`: the failure mode is process termination, not propagation.
pub(crate) fn load_overrides(host_data_dirs: &[PathBuf]) -> OverrideMap {
 let mut map = OverrideMap::default();
 for dir in host_data_dirs {
 load_one_cfgd(&dir.join("bionic_translation/cfg.d"), &mut map);
 }
 load_one_cfgd(Path::new(SYSTEM_CFG_DIR), &mut map);
 map
}

fn load_one_cfgd(cfgd: &Path, map: &mut OverrideMap) {
 let entries = match fs::read_dir(cfgd) {
 Ok(entries) => entries,
 Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
 Err(e) => {
 eprintln!("bionic_loader: cannot open {}: {e}", cfgd.display());
 std::process::exit(1);
 }
 };

 let mut files: Vec<PathBuf> = entries
.filter_map(|e| e.ok())
.map(|e| e.path())
.filter(|p| p.is_file())
.collect();
 // Deterministic ordering independent of the directory's on-disk order,
 // since override precedence depends on which file loads first.
 files.sort();

 for path in files {
 let contents = fs::read_to_string(&path).unwrap_or_else(|e| {
 eprintln!("bionic_loader: cannot read {}: {e}", path.display());
 std::process::exit(1);
 });
 map.push_all(parse_cfg_file(&path, &contents));
 }
}

fn parse_cfg_file(path: &Path, contents: &str) -> Vec<(String, String)> {
 let mut pairs = Vec::new();
 for (lineno, line) in contents.lines().enumerate() {
 let line = line.trim();
 if line.is_empty() || line.starts_with('#') {
 continue;
 }
 let mut fields = line.split_ascii_whitespace();
 let (Some(from), Some(to), None) = (fields.next(), fields.next(), fields.next()) else {
 eprintln!(
 "bionic_loader: {}:{}: malformed override line: {line:?}",
 path.display(),
 lineno + 1
);
 std::process::exit(1);
 };
 pairs.push((from.to_string(), to.to_string()));
 }
 pairs
}

/// Splits the host-data-dir environment variable the same way [`crate::path`]
/// splits the search-path variable.
pub(crate) fn host_data_dirs_from_env(var_name: &str) -> Vec<PathBuf> {
 std::env::var_os(var_name)
.map(|val| crate::path::split_colon_list(&val))
.unwrap_or_default()
}

#[allow(dead_code)]
pub(crate) fn is_set(var: &OsStr) -> bool {
 !var.is_empty()
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn parses_well_formed_lines_skipping_comments_and_blanks() {
 let pairs = parse_cfg_file(
 Path::new("test.cfg"),
 "# comment\n\nlibc.so libc_guest.so.0\n libm.so libm_guest.so.0 \n");
 assert_eq!(
 pairs,
 vec![
 ("libc.so".to_string(), "libc_guest.so.0".to_string()),
 ("libm.so".to_string(), "libm_guest.so.0".to_string()),
 ]
);
 }

 #[test]
 fn override_map_first_match_wins() {
 let mut map = OverrideMap::default();
 map.push_all(vec![
 ("libc.so".to_string(), "libc_guest.so.0".to_string()),
 ("libc.so".to_string(), "libc_other.so".to_string()),
 ]);
 assert_eq!(map.resolve("libc.so"), "libc_guest.so.0");
 }

 #[test]
 fn override_map_passes_through_unknown_name() {
 let map = OverrideMap::default();
 assert_eq!(map.resolve("libfoo.so"), "libfoo.so");
 }
}
