//! Implementation of the CP-Trie lookup structure.
//!
//! Fifteen rank-indexed bitmap levels (boundaries /16, /24 and so on to /128) over
//! one shared leaf array. Every level keeps two bitmaps per 64-bit word:
//! leaf presence addressing the shared leaf array through a rank running
//! across all levels, and child presence addressing the next level's chunks
//! through a per-level rank. Lookup is a backtrack-free descent; insertion
//! leaf-pushes shorter prefixes ahead of itself to keep it that way.

use crate::error::{check_route, InsertError};
use crate::leaf::{LeafRuns, LeafStore};
use crate::level::bitmap::{self, BitmapLevel, MSB, WORDS_PER_CHUNK};
use crate::{half_keys, octet_stride, prefix_mask, InitError, Lpm, OCTET_BOUNDARIES};

/// Chunks the /16 level needs to cover the full first stride.
const TOP_CHUNKS: u32 = (1 << 16) / (WORDS_PER_CHUNK as u32 * 64);

/// Pre-sized capacities of a [`CpTrie`].
///
/// All arrays are allocated once at these sizes and never grow; a route set
/// that does not fit produces [`InsertError::LevelFull`] or
/// [`InsertError::LeafFull`]. The defaults accommodate a forwarding table
/// of roughly 100k IPv6 routes.
#[derive(Debug, Clone)]
pub struct CpTrieConfig {
    /// Chunk capacity per level, from /16 to /128. The first entry is fixed
    /// (the /16 level is preallocated in full).
    pub level_chunks: [u32; 15],
    /// Capacity of the shared leaf array.
    pub leaf_entries: u32,
}

impl Default for CpTrieConfig {
    fn default() -> Self {
        Self {
            level_chunks: [
                TOP_CHUNKS,
                75,
                6_500,
                8_500,
                14_000,
                1_000,
                1_000,
                50,
                50,
                50,
                50,
                50,
                50,
                50,
                50,
            ],
            leaf_entries: 9_000_000,
        }
    }
}

/// An IPv6 forwarding table as a CP-Trie.
///
/// ```
/// # use lpm_trie::{CpTrie, Lpm};
/// # use std::net::Ipv6Addr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut fib = CpTrie::new();
/// fib.insert("2001:db8::".parse::<Ipv6Addr>()?.into(), 32, 5)?;
/// fib.insert("2001:db8::1".parse::<Ipv6Addr>()?.into(), 128, 9)?;
/// assert_eq!(fib.lookup("2001:db8::1".parse::<Ipv6Addr>()?.into()), 9);
/// assert_eq!(fib.lookup("2001:db8::2".parse::<Ipv6Addr>()?.into()), 5);
/// assert_eq!(fib.lookup("2001:db9::1".parse::<Ipv6Addr>()?.into()), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CpTrie {
    default_nh: u8,
    levels: Vec<BitmapLevel>,
    leaves: LeafStore,
}

impl Default for CpTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl CpTrie {
    /// Create an empty table with the default capacities.
    pub fn new() -> Self {
        Self::with_config(&CpTrieConfig::default()).expect("the default configuration is valid")
    }

    /// Create an empty table with explicit capacities.
    pub fn with_config(config: &CpTrieConfig) -> Result<Self, InitError> {
        if config.level_chunks.iter().any(|&c| c == 0) || config.leaf_entries == 0 {
            return Err(InitError::ZeroCapacity);
        }
        if config.level_chunks[0] != TOP_CHUNKS {
            return Err(InitError::TopLevelChunks { required: TOP_CHUNKS });
        }
        let mut levels: Vec<BitmapLevel> = OCTET_BOUNDARIES
            .iter()
            .zip(config.level_chunks.iter())
            .map(|(&bits, &chunks)| BitmapLevel::new(bits, chunks))
            .collect();
        // the first stride is always fully resident
        levels[0].count = TOP_CHUNKS;
        log::debug!("cp-trie initialized, {} leaf entries", config.leaf_entries);
        Ok(Self {
            default_nh: 0,
            levels,
            leaves: LeafStore::new(config.leaf_entries as usize),
        })
    }

    /// Insert a route. A prefix length of 0 sets the table-wide default
    /// next-hop.
    pub fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        check_route(prefix_len, nexthop)?;
        let prefix = prefix & prefix_mask(prefix_len);
        self.insert_from(prefix, prefix_len, nexthop, prefix_len)
    }

    /// Look up the next-hop of the longest stored prefix matching `key`, or
    /// the default next-hop (0 unless a /0 route was inserted).
    pub fn lookup(&self, key: u128) -> u8 {
        let mut stride = octet_stride(key, 0);
        let mut idx = (stride >> 6) as usize;
        let mut bit = stride & 63;
        let mut li = 0;
        loop {
            let level = &self.levels[li];
            if li + 1 < self.levels.len() && level.child[idx].bit(bit) {
                stride = octet_stride(key, li + 1);
                idx = level.child[idx].index_of(bit) as usize * WORDS_PER_CHUNK
                    + (stride >> 6) as usize;
                bit = stride & 63;
                li += 1;
            } else {
                let leaf = &level.leaf[idx];
                if leaf.bit(bit) {
                    return self.leaves.nexthop_at(leaf.index_of(bit) as usize);
                }
                return self.default_nh;
            }
        }
    }

    /// Length of the prefix [`lookup`](Self::lookup) would match for `key`
    /// (0 when only the default next-hop applies).
    pub fn matched_prefix_len(&self, key: u128) -> u8 {
        let mut stride = octet_stride(key, 0);
        let mut idx = (stride >> 6) as usize;
        let mut bit = stride & 63;
        let mut li = 0;
        loop {
            let level = &self.levels[li];
            if li + 1 < self.levels.len() && level.child[idx].bit(bit) {
                stride = octet_stride(key, li + 1);
                idx = level.child[idx].index_of(bit) as usize * WORDS_PER_CHUNK
                    + (stride >> 6) as usize;
                bit = stride & 63;
                li += 1;
            } else {
                let leaf = &level.leaf[idx];
                if leaf.bit(bit) {
                    return self.leaves.plen_at(leaf.index_of(bit) as usize);
                }
                return 0;
            }
        }
    }

    /// Bytes of storage in use.
    pub fn mem_size(&self) -> usize {
        self.levels.iter().map(|l| l.mem_size()).sum::<usize>() + self.leaves.mem_size()
    }

    /// Descend the stride schedule until the level owning `level` bits is
    /// reached, pushing any shorter occupant out of the way.
    ///
    /// Called with `level == prefix_len` from [`insert`](Self::insert) and
    /// with `level > prefix_len` when re-inserting pushed-down entries.
    fn insert_from(
        &mut self,
        key: u128,
        prefix_len: u8,
        nexthop: u8,
        level: u8,
    ) -> Result<(), InsertError> {
        if prefix_len == 0 {
            self.default_nh = nexthop;
            return Ok(());
        }
        let mut stride = octet_stride(key, 0);
        let mut idx = (stride >> 6) as usize;
        let mut bit = stride & 63;
        for li in 0..self.levels.len() {
            if level <= self.levels[li].bits {
                return self.insert_leaf(li, idx, bit, level, key, prefix_len, nexthop);
            }
            self.push_leaf(li, idx, bit, key)?;
            let chunk = bitmap::chunk_for_child(&mut self.levels, li, idx, bit)?;
            stride = octet_stride(key, li + 1);
            idx = chunk as usize * WORDS_PER_CHUNK + (stride >> 6) as usize;
            bit = stride & 63;
        }
        unreachable!("no level owns {level} bits");
    }

    /// Fill the leaf slots a route owns at level `li`, starting at word
    /// `start_idx`, bit `start_bit`.
    ///
    /// The route covers `2^(bits - level)` consecutive stride positions.
    /// Per 64-bit word: positions delegated to a child collect for
    /// re-insertion one level down, positions with a longer occupant are
    /// left alone, equal or shorter occupants are overwritten in place, and
    /// fresh positions accumulate into runs. The word's bitmap, the ranks
    /// it shifts and the leaf entries themselves commit together before the
    /// next word, keeping the rank invariant intact at every step.
    fn insert_leaf(
        &mut self,
        li: usize,
        start_idx: usize,
        start_bit: u32,
        level: u8,
        key: u128,
        prefix_len: u8,
        nexthop: u8,
    ) -> Result<(), InsertError> {
        let bits = self.levels[li].bits;
        let num_leaves = 1usize << (bits - level);
        if self.leaves.count() + num_leaves > self.leaves.size() {
            log::error!("leaf array is full, increase its capacity");
            return Err(InsertError::LeafFull);
        }

        let mut pushed: Vec<u128> = Vec::new();
        let mut i = 0usize;
        while i < num_leaves {
            let pos = start_bit as usize + i;
            let idx = start_idx + pos / 64;
            let in_word = (64 - pos % 64).min(num_leaves - i);
            let mut runs = LeafRuns::new();
            let mut word_bits: u64 = 0;
            for j in 0..in_word {
                let bit = (pos % 64 + j) as u32;
                if self.levels[li].child[idx].bit(bit) {
                    pushed.push(((key >> (128 - bits)) + (i + j) as u128) << (128 - bits));
                } else {
                    let n_idx = bitmap::leaf_index(&self.levels, li, idx, bit) as usize;
                    if self.levels[li].leaf[idx].bit(bit) {
                        if self.leaves.plen_at(n_idx) <= prefix_len {
                            self.leaves.set(n_idx, nexthop, prefix_len);
                        }
                    } else {
                        runs.push(n_idx as u32);
                        word_bits |= MSB >> bit;
                    }
                }
            }
            if word_bits != 0 {
                self.commit_leaf_word(li, idx, word_bits);
                self.leaves.insert_runs(&runs, nexthop, prefix_len)?;
            }
            i += in_word;
        }

        if li + 1 < self.levels.len() {
            for prefix in pushed {
                let (lo, hi) = half_keys(prefix, bits);
                self.insert_from(lo, prefix_len, nexthop, bits + 1)?;
                self.insert_from(hi, prefix_len, nexthop, bits + 1)?;
            }
        }
        Ok(())
    }

    /// Set `word_bits` in the leaf bitmap at (`li`, `idx`) and renumber
    /// every rank those bits displace: populated words to the right within
    /// the level and every populated word of every deeper level, since the
    /// shared leaf array is segmented level by level.
    fn commit_leaf_word(&mut self, li: usize, idx: usize, word_bits: u64) {
        let new_leaves = word_bits.count_ones();
        let was_empty = self.levels[li].leaf[idx].bitmap == 0;
        self.levels[li].leaf[idx].bitmap |= word_bits;
        if was_empty {
            self.levels[li].leaf[idx].rank = bitmap::leaf_rank_seed(&self.levels, li, idx);
        }
        let used = self.levels[li].words_in_use();
        for w in idx + 1..used {
            let node = &mut self.levels[li].leaf[w];
            if node.bitmap != 0 {
                node.rank += new_leaves;
            }
        }
        for level in self.levels[li + 1..].iter_mut() {
            for w in 0..level.words_in_use() {
                let node = &mut level.leaf[w];
                if node.bitmap != 0 {
                    node.rank += new_leaves;
                }
            }
        }
    }

    /// If the position (`li`, `idx`, `bit`) holds a leaf, move it one level
    /// down so the position can delegate to a child chunk.
    fn push_leaf(&mut self, li: usize, idx: usize, bit: u32, key: u128) -> Result<(), InsertError> {
        if !self.levels[li].leaf[idx].bit(bit) {
            return Ok(());
        }
        let bits = self.levels[li].bits;
        let n_idx = bitmap::leaf_index(&self.levels, li, idx, bit) as usize;
        let (nexthop, plen) = self.leaves.remove(n_idx);

        self.levels[li].leaf[idx].bitmap &= !(MSB >> bit);
        let used = self.levels[li].words_in_use();
        for w in idx + 1..used {
            let node = &mut self.levels[li].leaf[w];
            if node.bitmap != 0 && node.rank > 0 {
                node.rank -= 1;
            }
        }
        for level in self.levels[li + 1..].iter_mut() {
            for w in 0..level.words_in_use() {
                let node = &mut level.leaf[w];
                if node.bitmap != 0 && node.rank > 0 {
                    node.rank -= 1;
                }
            }
        }

        let base = (key >> (128 - bits)) << (128 - bits);
        let (lo, hi) = half_keys(base, bits);
        self.insert_from(lo, plen, nexthop, bits + 1)?;
        self.insert_from(hi, plen, nexthop, bits + 1)
    }

    /// Recompute every rank from scratch and compare with the
    /// incrementally maintained values. Test support for the rank
    /// invariant.
    #[cfg(test)]
    pub(crate) fn check_ranks(&self) -> Result<(), String> {
        let mut running = 0u32;
        for level in &self.levels {
            for w in 0..level.words_in_use() {
                let node = &level.leaf[w];
                if node.bitmap != 0 {
                    if node.rank != running {
                        return Err(format!(
                            "leaf rank mismatch in level /{} word {w}: {} != {running}",
                            level.bits, node.rank
                        ));
                    }
                    running += node.bitmap.count_ones();
                }
            }
        }
        if running as usize != self.leaves.count() {
            return Err(format!(
                "leaf bitmap population {running} does not match the leaf array ({})",
                self.leaves.count()
            ));
        }
        for level in &self.levels {
            let mut chunks = 0u32;
            for w in 0..level.words_in_use() {
                let node = &level.child[w];
                if node.bitmap != 0 {
                    if node.rank != chunks {
                        return Err(format!(
                            "child rank mismatch in level /{} word {w}: {} != {chunks}",
                            level.bits, node.rank
                        ));
                    }
                    chunks += node.bitmap.count_ones();
                }
            }
        }
        Ok(())
    }
}

impl Lpm for CpTrie {
    fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        CpTrie::insert(self, prefix, prefix_len, nexthop)
    }

    fn lookup(&self, key: u128) -> u8 {
        CpTrie::lookup(self, key)
    }

    fn matched_prefix_len(&self, key: u128) -> u8 {
        CpTrie::matched_prefix_len(self, key)
    }

    fn mem_size(&self) -> usize {
        CpTrie::mem_size(self)
    }
}
