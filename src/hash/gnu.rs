//! GNU `.gnu.hash` bloom-filtered bucket/chain lookup.
use crate::arch::ElfSymbol;

pub(crate) struct GnuHash;

impl GnuHash {
    /// `h = 5381`, `h = h*33 + c` for each byte — djb2.
    #[inline]
    pub(crate) fn hash(name: &[u8]) -> u32 {
        let mut h: u32 = 5381;
        for &b in name {
            h = h.wrapping_mul(33).wrapping_add(b as u32);
        }
        h
    }

    /// Rejects via the bloom filter, then walks the chain. `symbias` is the
    /// first symtab index the hash table covers (entries below it are
    /// reached only through `.hash`/direct index, never through this table).
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn lookup(
        hash: u32,
        nbucket: usize,
        symbias: usize,
        maskwords: usize,
        shift: u32,
        bloom: *const usize,
        buckets: *const u32,
        chains: *const u32,
        symtab: *const ElfSymbol,
        strtab_get: impl Fn(usize) -> &'static str,
        name: &str,
    ) -> Option<usize> {
        let w = usize::BITS;
        let word = unsafe { bloom.add((hash as usize / w as usize) & (maskwords - 1)).read() };
        let bit1 = 1usize << (hash % w);
        let bit2 = 1usize << ((hash >> shift) % w);
        if word & bit1 == 0 || word & bit2 == 0 {
            return None;
        }

        let mut idx = unsafe { buckets.add(hash as usize % nbucket).read() } as usize;
        if idx == 0 {
            return None;
        }
        loop {
            let chain_hash = unsafe { chains.add(idx - symbias).read() };
            if (chain_hash ^ hash) >> 1 == 0 {
                let sym = unsafe { &*symtab.add(idx) };
                if strtab_get(sym.st_name) == name && sym.is_ok_bind() && !sym.is_undef() {
                    return Some(idx);
                }
            }
            if chain_hash & 1 != 0 {
                return None;
            }
            idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_djb2() {
        assert_eq!(GnuHash::hash(b""), 5381);
        assert_eq!(GnuHash::hash(b"a"), 5381u32.wrapping_mul(33).wrapping_add(b'a' as u32));
    }
}
