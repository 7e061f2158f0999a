//! Symbol resolver (C4): SysV and GNU hash algorithms, sharing a single
//! query descriptor that memoizes each algorithm's hash at most once.
mod gnu;
mod sysv;

pub(crate) use gnu::GnuHash;
pub(crate) use sysv::SysvHash;

/// A symbol-name query: the name plus memoized per-algorithm hashes, so a
/// lookup across multiple modules (lookup order) hashes the query at
/// most once per algorithm regardless of how many modules it's run against.
pub(crate) struct SymbolQuery<'a> {
    name: &'a str,
    sysv_hash: Option<u32>,
    gnu_hash: Option<u32>,
}

impl<'a> SymbolQuery<'a> {
    pub(crate) fn new(name: &'a str) -> Self {
        SymbolQuery { name, sysv_hash: None, gnu_hash: None }
    }

    pub(crate) fn name(&self) -> &str {
        self.name
    }

    pub(crate) fn sysv_hash(&mut self) -> u32 {
        *self.sysv_hash.get_or_insert_with(|| SysvHash::hash(self.name.as_bytes()))
    }

    pub(crate) fn gnu_hash(&mut self) -> u32 {
        *self.gnu_hash.get_or_insert_with(|| GnuHash::hash(self.name.as_bytes()))
    }
}
