//! Implementation of the Poptrie lookup structure.
//!
//! The first 16 key bits are direct-indexed: a flat leaf array holds routes
//! of length up to /16 and a [`DirectIndex`](crate::dir::DirectIndex) maps
//! each 16-bit stride value to its chunk in the first node level. Below
//! that, nineteen levels of 64-ary nodes consume 6 bits each; the last
//! level packs the remaining 4 key bits at 4-bit spacing inside its 64-bit
//! vectors. All node levels share one leaf array addressed through
//! `leafvec`/`base1`.

use crate::dir::DirectIndex;
use crate::error::{check_route, InsertError};
use crate::leaf::{LeafRuns, LeafStore};
use crate::level::poptrie::{leaf_base_seed, leaf_index, next_level_index, PoptrieLevel};
use crate::{half_keys, prefix_mask, InitError, Lpm};

/// Stride values of the direct-indexed first level.
const DIR_SIZE: usize = 1 << 16;

/// Prefix-length boundaries of the node levels. Level k holds leaves for
/// lengths in `(BOUNDS[k] .. BOUNDS[k] + 6]`.
const NODE_BOUNDS: [u8; 19] = [
    16, 22, 28, 34, 40, 46, 52, 58, 64, 70, 76, 82, 88, 94, 100, 106, 112, 118, 124,
];

/// 6-bit stride of node level `k`, except for the deepest level where the
/// remaining 4 key bits are spread at 4-bit spacing.
#[inline(always)]
fn node_stride(key: u128, k: usize) -> u32 {
    if k < 18 {
        ((key >> (106 - 6 * k)) & 63) as u32
    } else {
        ((key & 15) << 2) as u32
    }
}

/// Pre-sized capacities of a [`Poptrie`].
///
/// All arrays are allocated once at these sizes and never grow; a route set
/// that does not fit produces [`InsertError::LevelFull`] or
/// [`InsertError::LeafFull`]. The defaults accommodate a forwarding table
/// of roughly 100k IPv6 routes.
#[derive(Debug, Clone)]
pub struct PoptrieConfig {
    /// Node capacity per level, from the level below /16 to the level
    /// below /124.
    pub level_nodes: [u32; 19],
    /// Capacity of the shared leaf array.
    pub leaf_entries: u32,
}

impl Default for PoptrieConfig {
    fn default() -> Self {
        Self {
            level_nodes: [
                400, 3_000, 16_000, 14_000, 15_000, 28_000, 2_000, 2_000, 1_000, 100, 100, 100,
                100, 100, 100, 100, 100, 100, 100,
            ],
            leaf_entries: 2_500_000,
        }
    }
}

/// An IPv6 forwarding table as a Poptrie.
///
/// ```
/// # use lpm_trie::{Poptrie, Lpm};
/// # use std::net::Ipv6Addr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut fib = Poptrie::new();
/// fib.insert("2001:db8::".parse::<Ipv6Addr>()?.into(), 32, 5)?;
/// fib.insert("2001:db8::1".parse::<Ipv6Addr>()?.into(), 128, 9)?;
/// assert_eq!(fib.lookup("2001:db8::1".parse::<Ipv6Addr>()?.into()), 9);
/// assert_eq!(fib.lookup("2001:db8::2".parse::<Ipv6Addr>()?.into()), 5);
/// assert_eq!(fib.lookup("2001:db9::1".parse::<Ipv6Addr>()?.into()), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Poptrie {
    default_nh: u8,
    dir: DirectIndex,
    top_leaves: LeafStore,
    leaves: LeafStore,
    levels: Vec<PoptrieLevel>,
}

impl Default for Poptrie {
    fn default() -> Self {
        Self::new()
    }
}

impl Poptrie {
    /// Create an empty table with the default capacities.
    pub fn new() -> Self {
        Self::with_config(&PoptrieConfig::default()).expect("the default configuration is valid")
    }

    /// Create an empty table with explicit capacities.
    pub fn with_config(config: &PoptrieConfig) -> Result<Self, InitError> {
        if config.level_nodes.iter().any(|&n| n == 0) || config.leaf_entries == 0 {
            return Err(InitError::ZeroCapacity);
        }
        let levels = NODE_BOUNDS
            .iter()
            .zip(config.level_nodes.iter())
            .map(|(&bits, &nodes)| PoptrieLevel::new(bits, nodes))
            .collect();
        // one slot per 16-bit stride value, directly indexed
        let mut top_leaves = LeafStore::new(DIR_SIZE);
        top_leaves.set_count(DIR_SIZE);
        log::debug!("poptrie initialized, {} leaf entries", config.leaf_entries);
        Ok(Self {
            default_nh: 0,
            dir: DirectIndex::new(DIR_SIZE),
            top_leaves,
            leaves: LeafStore::new(config.leaf_entries as usize),
            levels,
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
        let idx16 = (key >> 112) as usize;
        let top = self.top_leaves.nexthop_at(idx16);
        if top != 0 {
            return top;
        }
        let chunk = self.dir.get(idx16);
        if chunk == 0 {
            return self.default_nh;
        }
        let mut idx = (chunk - 1) as usize;
        let mut k = 0;
        let mut stride = node_stride(key, 0);
        loop {
            let node = &self.levels[k].nodes[idx];
            if node.has_child(stride) {
                idx = node.child_index(stride) as usize;
                k += 1;
                stride = node_stride(key, k);
            } else {
                if node.has_leaf(stride) {
                    return self.leaves.nexthop_at(node.leaf_entry_index(stride) as usize);
                }
                return self.default_nh;
            }
        }
    }

    /// Length of the prefix [`lookup`](Self::lookup) would match for `key`
    /// (0 when only the default next-hop applies).
    pub fn matched_prefix_len(&self, key: u128) -> u8 {
        let idx16 = (key >> 112) as usize;
        if self.top_leaves.nexthop_at(idx16) != 0 {
            return self.top_leaves.plen_at(idx16);
        }
        let chunk = self.dir.get(idx16);
        if chunk == 0 {
            return 0;
        }
        let mut idx = (chunk - 1) as usize;
        let mut k = 0;
        let mut stride = node_stride(key, 0);
        loop {
            let node = &self.levels[k].nodes[idx];
            if node.has_child(stride) {
                idx = node.child_index(stride) as usize;
                k += 1;
                stride = node_stride(key, k);
            } else {
                if node.has_leaf(stride) {
                    return self.leaves.plen_at(node.leaf_entry_index(stride) as usize);
                }
                return 0;
            }
        }
    }

    /// Bytes of storage in use.
    pub fn mem_size(&self) -> usize {
        self.levels.iter().map(|l| l.mem_size()).sum::<usize>()
            + self.leaves.mem_size()
            + self.top_leaves.mem_size()
            + self.dir.mem_size()
    }

    /// Descend the stride schedule until the level owning `level` bits is
    /// reached, pushing any shorter occupant out of the way.
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
        let idx16 = (key >> 112) as usize;

        // routes up to /16 live in the direct-indexed leaf array
        if level <= 16 {
            let num_slots = 1usize << (16 - level);
            for i in 0..num_slots {
                if self.dir.get(idx16 + i) != 0 {
                    // the slot already delegates, the new route goes below it
                    let base = ((key >> 112) + i as u128) << 112;
                    let (lo, hi) = half_keys(base, 16);
                    self.insert_from(lo, prefix_len, nexthop, 17)?;
                    self.insert_from(hi, prefix_len, nexthop, 17)?;
                } else {
                    if self.top_leaves.plen_at(idx16 + i) > prefix_len {
                        continue;
                    }
                    self.top_leaves.set(idx16 + i, nexthop, prefix_len);
                }
            }
            return Ok(());
        }

        // an occupant of the top level moves below before its slot delegates
        if self.top_leaves.nexthop_at(idx16) != 0 {
            let nh = self.top_leaves.nexthop_at(idx16);
            let plen = self.top_leaves.plen_at(idx16);
            self.top_leaves.set(idx16, 0, 0);
            let base = (key >> 112) << 112;
            let (lo, hi) = half_keys(base, 16);
            self.insert_from(lo, plen, nh, 17)?;
            self.insert_from(hi, plen, nh, 17)?;
        }

        if self.dir.get(idx16) == 0 {
            let chunk_id = self.dir.next_chunk_id(idx16);
            self.levels[0].insert_node(chunk_id)?;
            self.dir.set_chunk_id(idx16, chunk_id);
        }
        let mut idx = (self.dir.get(idx16) - 1) as usize;
        for k in 0..self.levels.len() {
            let stride = node_stride(key, k);
            if level <= self.levels[k].bits + 6 {
                return self.insert_leaf(k, idx, stride, key, prefix_len, nexthop, level);
            }
            self.push_leaf(k, idx, stride, key)?;
            idx = next_level_index(&mut self.levels, k, idx, stride)? as usize;
        }
        unreachable!("no level owns {level} bits");
    }

    /// Fill the leaf slots a route owns at node (`k`, `idx`), starting at
    /// `stride`. Positions delegated to a child collect for re-insertion
    /// one level down, longer occupants stay, fresh positions accumulate
    /// into runs committed together with the leaf vector.
    #[allow(clippy::too_many_arguments)]
    fn insert_leaf(
        &mut self,
        k: usize,
        idx: usize,
        stride: u32,
        key: u128,
        prefix_len: u8,
        nexthop: u8,
        level: u8,
    ) -> Result<(), InsertError> {
        let curr = self.levels[k].bits + 6;
        let num_leaves = 1usize << (curr - level);
        if self.leaves.count() + num_leaves > self.leaves.size() {
            log::error!("leaf array is full, increase its capacity");
            return Err(InsertError::LeafFull);
        }

        let mut pushed: Vec<u128> = Vec::new();
        let mut runs = LeafRuns::new();
        let mut vec_bits: u64 = 0;
        for i in 0..num_leaves {
            let bit = stride + i as u32;
            if self.levels[k].nodes[idx].has_child(bit) {
                debug_assert!(curr <= 124, "the deepest level has no children");
                pushed.push(((key >> (128 - curr)) + i as u128) << (128 - curr));
            } else {
                let n_idx = leaf_index(&self.levels, k, idx, bit) as usize;
                if self.levels[k].nodes[idx].has_leaf(bit) {
                    if self.leaves.plen_at(n_idx) > prefix_len {
                        continue;
                    }
                    self.leaves.set(n_idx, nexthop, prefix_len);
                } else {
                    runs.push(n_idx as u32);
                    vec_bits |= 1 << bit;
                }
            }
        }

        if vec_bits != 0 {
            let new_leaves = vec_bits.count_ones();
            let was_empty = self.levels[k].nodes[idx].leafvec == 0;
            self.levels[k].nodes[idx].leafvec |= vec_bits;
            if was_empty {
                self.levels[k].nodes[idx].base1 = leaf_base_seed(&self.levels, k, idx);
            }
            for i in idx + 1..self.levels[k].count as usize {
                let node = &mut self.levels[k].nodes[i];
                if node.leafvec != 0 {
                    node.base1 += new_leaves;
                }
            }
            for deeper in self.levels[k + 1..].iter_mut() {
                for i in 0..deeper.count as usize {
                    let node = &mut deeper.nodes[i];
                    if node.leafvec != 0 {
                        node.base1 += new_leaves;
                    }
                }
            }
            self.leaves.insert_runs(&runs, nexthop, prefix_len)?;
        }

        if k + 1 < self.levels.len() {
            for prefix in pushed {
                let (lo, hi) = half_keys(prefix, curr);
                self.insert_from(lo, prefix_len, nexthop, curr + 1)?;
                self.insert_from(hi, prefix_len, nexthop, curr + 1)?;
            }
        }
        Ok(())
    }

    /// If the position (`k`, `idx`, `stride`) holds a leaf, move it one
    /// level down so the position can delegate to a child node.
    fn push_leaf(&mut self, k: usize, idx: usize, stride: u32, key: u128) -> Result<(), InsertError> {
        if !self.levels[k].nodes[idx].has_leaf(stride) {
            return Ok(());
        }
        let curr = self.levels[k].bits + 6;
        let n_idx = leaf_index(&self.levels, k, idx, stride) as usize;
        let (nexthop, plen) = self.leaves.remove(n_idx);

        self.levels[k].nodes[idx].leafvec &= !(1u64 << stride);
        for i in idx + 1..self.levels[k].count as usize {
            let node = &mut self.levels[k].nodes[i];
            if node.leafvec != 0 && node.base1 > 0 {
                node.base1 -= 1;
            }
        }
        for deeper in self.levels[k + 1..].iter_mut() {
            for i in 0..deeper.count as usize {
                let node = &mut deeper.nodes[i];
                if node.leafvec != 0 && node.base1 > 0 {
                    node.base1 -= 1;
                }
            }
        }

        let base = (key >> (128 - curr)) << (128 - curr);
        let (lo, hi) = half_keys(base, curr);
        self.insert_from(lo, plen, nexthop, curr + 1)?;
        self.insert_from(hi, plen, nexthop, curr + 1)
    }
}

impl Lpm for Poptrie {
    fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        Poptrie::insert(self, prefix, prefix_len, nexthop)
    }

    fn lookup(&self, key: u128) -> u8 {
        Poptrie::lookup(self, key)
    }

    fn matched_prefix_len(&self, key: u128) -> u8 {
        Poptrie::matched_prefix_len(self, key)
    }

    fn mem_size(&self) -> usize {
        Poptrie::mem_size(self)
    }
}
