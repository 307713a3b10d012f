//! Implementation of the SAIL-U lookup structure.
//!
//! Fifteen uncompressed chunk levels (boundaries /16, /24 and so on to /128). Every
//! level stores its own next-hops, so a route of length P lives at the
//! level whose boundary first covers P and no leaf-pushing is needed:
//! lookup walks the chunk-id chain and remembers the deepest non-empty
//! next-hop on the way down.

use crate::error::{check_route, InsertError};
use crate::level::sail::{self, SailLevel, CHUNK};
use crate::{octet_stride, prefix_mask, InitError, Lpm, OCTET_BOUNDARIES};

/// Chunks the /16 level needs to cover the full first stride.
const TOP_CHUNKS: u32 = (1 << 16) / CHUNK as u32;

/// Pre-sized capacities of a [`SailU`] or [`SailL`](crate::SailL).
///
/// All arrays are allocated once at these sizes and never grow; a route set
/// that does not fit produces [`InsertError::LevelFull`]. The defaults
/// accommodate a forwarding table of roughly 100k IPv6 routes.
#[derive(Debug, Clone)]
pub struct SailConfig {
    /// Chunk capacity per level, from /16 to /128. The first entry is fixed
    /// (the /16 level is preallocated in full).
    pub level_chunks: [u32; 15],
}

impl Default for SailConfig {
    fn default() -> Self {
        Self {
            level_chunks: [
                TOP_CHUNKS,
                100,
                7_000,
                9_000,
                14_000,
                700,
                700,
                500,
                500,
                500,
                500,
                500,
                500,
                500,
                500,
            ],
        }
    }
}

/// Build the shared SAIL level chain from a configuration.
pub(crate) fn build_levels(config: &SailConfig) -> Result<Vec<SailLevel>, InitError> {
    if config.level_chunks.iter().any(|&c| c == 0) {
        return Err(InitError::ZeroCapacity);
    }
    if config.level_chunks[0] != TOP_CHUNKS {
        return Err(InitError::TopLevelChunks { required: TOP_CHUNKS });
    }
    let mut levels: Vec<SailLevel> = OCTET_BOUNDARIES
        .iter()
        .zip(config.level_chunks.iter())
        .map(|(&bits, &chunks)| SailLevel::new(bits, chunks))
        .collect();
    // the first stride is always fully resident
    levels[0].count = TOP_CHUNKS;
    Ok(levels)
}

/// An IPv6 forwarding table as a SAIL-U trie.
///
/// ```
/// # use lpm_trie::{SailU, Lpm};
/// # use std::net::Ipv6Addr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut fib = SailU::new();
/// fib.insert("2001:db8::".parse::<Ipv6Addr>()?.into(), 32, 5)?;
/// fib.insert("2001:db8::1".parse::<Ipv6Addr>()?.into(), 128, 9)?;
/// assert_eq!(fib.lookup("2001:db8::1".parse::<Ipv6Addr>()?.into()), 9);
/// assert_eq!(fib.lookup("2001:db8::2".parse::<Ipv6Addr>()?.into()), 5);
/// assert_eq!(fib.lookup("2001:db9::1".parse::<Ipv6Addr>()?.into()), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SailU {
    default_nh: u8,
    levels: Vec<SailLevel>,
}

impl Default for SailU {
    fn default() -> Self {
        Self::new()
    }
}

impl SailU {
    /// Create an empty table with the default capacities.
    pub fn new() -> Self {
        Self::with_config(&SailConfig::default()).expect("the default configuration is valid")
    }

    /// Create an empty table with explicit capacities.
    pub fn with_config(config: &SailConfig) -> Result<Self, InitError> {
        let levels = build_levels(config)?;
        log::debug!("sail-u initialized");
        Ok(Self { default_nh: 0, levels })
    }

    /// Insert a route. A prefix length of 0 sets the table-wide default
    /// next-hop.
    pub fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        check_route(prefix_len, nexthop)?;
        if prefix_len == 0 {
            self.default_nh = nexthop;
            return Ok(());
        }
        let key = prefix & prefix_mask(prefix_len);
        let mut idx = (key >> 112) as usize;
        for li in 0..self.levels.len() {
            if prefix_len <= self.levels[li].bits {
                self.insert_leaf(li, idx, prefix_len, nexthop);
                return Ok(());
            }
            let chunk = sail::chunk_for_child(&mut self.levels, li, idx)?;
            idx = (chunk - 1) as usize * CHUNK + octet_stride(key, li + 1) as usize;
        }
        unreachable!("no level owns {prefix_len} bits");
    }

    /// Fill the slots a route owns at its home level. A route of length P
    /// covers `2^(bits - P)` slots; slots already written by a longer
    /// prefix keep their entry.
    fn insert_leaf(&mut self, li: usize, idx: usize, prefix_len: u8, nexthop: u8) {
        let level = &mut self.levels[li];
        debug_assert!(li == 0 || prefix_len > level.bits - 8, "route belongs to a parent level");
        let num_slots = 1usize << (level.bits - prefix_len);
        for slot in idx..idx + num_slots {
            if level.plen[slot] > prefix_len {
                continue;
            }
            level.nexthop[slot] = nexthop;
            level.plen[slot] = prefix_len;
        }
    }

    /// Look up the next-hop of the longest stored prefix matching `key`, or
    /// the default next-hop (0 unless a /0 route was inserted). The match
    /// improves monotonically with depth, so the deepest non-empty slot on
    /// the chunk-id chain wins.
    pub fn lookup(&self, key: u128) -> u8 {
        let mut nh = self.default_nh;
        let mut idx = (key >> 112) as usize;
        for li in 0..self.levels.len() {
            let level = &self.levels[li];
            if level.nexthop[idx] != 0 {
                nh = level.nexthop[idx];
            }
            if li + 1 >= self.levels.len() || level.chunk_id[idx] == 0 {
                break;
            }
            idx = (level.chunk_id[idx] - 1) as usize * CHUNK + octet_stride(key, li + 1) as usize;
        }
        nh
    }

    /// Length of the prefix [`lookup`](Self::lookup) would match for `key`
    /// (0 when only the default next-hop applies).
    pub fn matched_prefix_len(&self, key: u128) -> u8 {
        let mut matched = 0;
        let mut idx = (key >> 112) as usize;
        for li in 0..self.levels.len() {
            let level = &self.levels[li];
            if level.nexthop[idx] != 0 {
                matched = level.plen[idx];
            }
            if li + 1 >= self.levels.len() || level.chunk_id[idx] == 0 {
                break;
            }
            idx = (level.chunk_id[idx] - 1) as usize * CHUNK + octet_stride(key, li + 1) as usize;
        }
        matched
    }

    /// Bytes of storage in use.
    pub fn mem_size(&self) -> usize {
        self.levels.iter().map(|l| l.mem_size()).sum()
    }
}

impl Lpm for SailU {
    fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        SailU::insert(self, prefix, prefix_len, nexthop)
    }

    fn lookup(&self, key: u128) -> u8 {
        SailU::lookup(self, key)
    }

    fn matched_prefix_len(&self, key: u128) -> u8 {
        SailU::matched_prefix_len(self, key)
    }

    fn mem_size(&self) -> usize {
        SailU::mem_size(self)
    }
}
