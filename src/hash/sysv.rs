//! Classical SysV `.hash` bucket/chain lookup.
use crate::arch::ElfSymbol;

pub(crate) struct SysvHash;

impl SysvHash {
    /// The classical 4-bit-shift accumulation.
    #[inline]
    pub(crate) fn hash(name: &[u8]) -> u32 {
        let mut h: u32 = 0;
        for &b in name {
            h = (h << 4).wrapping_add(b as u32);
            let g = h & 0xf000_0000;
            if g != 0 {
                h ^= g >> 24;
            }
            h &= !g;
        }
        h
    }

    /// Walks `buckets[h % nbucket]`'s chain until a zero terminator or a
    /// name+visibility match.
    pub(crate) fn lookup(
        hash: u32,
        nbucket: usize,
        buckets: *const u32,
        chains: *const u32,
        symtab: *const ElfSymbol,
        strtab_get: impl Fn(usize) -> &'static str,
        name: &str,
    ) -> Option<usize> {
        let mut idx = unsafe { buckets.add(hash as usize % nbucket).read() } as usize;
        while idx != 0 {
            let sym = unsafe { &*symtab.add(idx) };
            if strtab_get(sym.st_name) == name && sym.is_ok_bind() && !sym.is_undef() {
                return Some(idx);
            }
            idx = unsafe { chains.add(idx).read() } as usize;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(SysvHash::hash(b""), 0);
        assert_eq!(SysvHash::hash(b"a"), 97);
        // distinct names must (almost always) hash differently
        assert_ne!(SysvHash::hash(b"printf"), SysvHash::hash(b"malloc"));
    }
}
