//! Implementation of the SAIL-L lookup structure.
//!
//! Same uncompressed chunk levels as [`SailU`](crate::SailU), but a slot
//! never holds a next-hop and a chunk id at the same time: inserting a
//! longer prefix below an occupied slot leaf-pushes the occupant one level
//! down first. Lookup therefore walks the chunk-id chain to its end and
//! reads a single slot there.

use crate::error::{check_route, InsertError};
use crate::level::sail::{self, SailLevel, CHUNK};
use crate::sail_u::{build_levels, SailConfig};
use crate::{half_keys, octet_stride, prefix_mask, InitError, Lpm};

/// An IPv6 forwarding table as a SAIL-L trie.
///
/// ```
/// # use lpm_trie::{SailL, Lpm};
/// # use std::net::Ipv6Addr;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut fib = SailL::new();
/// fib.insert("2001:db8::".parse::<Ipv6Addr>()?.into(), 32, 5)?;
/// fib.insert("2001:db8::1".parse::<Ipv6Addr>()?.into(), 128, 9)?;
/// assert_eq!(fib.lookup("2001:db8::1".parse::<Ipv6Addr>()?.into()), 9);
/// assert_eq!(fib.lookup("2001:db8::2".parse::<Ipv6Addr>()?.into()), 5);
/// assert_eq!(fib.lookup("2001:db9::1".parse::<Ipv6Addr>()?.into()), 0);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct SailL {
    default_nh: u8,
    levels: Vec<SailLevel>,
}

impl Default for SailL {
    fn default() -> Self {
        Self::new()
    }
}

impl SailL {
    /// Create an empty table with the default capacities.
    pub fn new() -> Self {
        Self::with_config(&SailConfig::default()).expect("the default configuration is valid")
    }

    /// Create an empty table with explicit capacities.
    pub fn with_config(config: &SailConfig) -> Result<Self, InitError> {
        let levels = build_levels(config)?;
        log::debug!("sail-l initialized");
        Ok(Self { default_nh: 0, levels })
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
        let mut idx = (key >> 112) as usize;
        let mut li = 0;
        while li + 1 < self.levels.len() && self.levels[li].chunk_id[idx] != 0 {
            idx = (self.levels[li].chunk_id[idx] - 1) as usize * CHUNK
                + octet_stride(key, li + 1) as usize;
            li += 1;
        }
        match self.levels[li].nexthop[idx] {
            0 => self.default_nh,
            nh => nh,
        }
    }

    /// Length of the prefix [`lookup`](Self::lookup) would match for `key`
    /// (0 when only the default next-hop applies).
    pub fn matched_prefix_len(&self, key: u128) -> u8 {
        let mut idx = (key >> 112) as usize;
        let mut li = 0;
        while li + 1 < self.levels.len() && self.levels[li].chunk_id[idx] != 0 {
            idx = (self.levels[li].chunk_id[idx] - 1) as usize * CHUNK
                + octet_stride(key, li + 1) as usize;
            li += 1;
        }
        if self.levels[li].nexthop[idx] != 0 {
            self.levels[li].plen[idx]
        } else {
            0
        }
    }

    /// Bytes of storage in use.
    pub fn mem_size(&self) -> usize {
        self.levels.iter().map(|l| l.mem_size()).sum()
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
        let mut idx = (key >> 112) as usize;
        for li in 0..self.levels.len() {
            if level <= self.levels[li].bits {
                return self.insert_leaf(li, idx, level, key, prefix_len, nexthop);
            }
            self.push_leaf(li, idx, key)?;
            let chunk = sail::chunk_for_child(&mut self.levels, li, idx)?;
            idx = (chunk - 1) as usize * CHUNK + octet_stride(key, li + 1) as usize;
        }
        unreachable!("no level owns {level} bits");
    }

    /// Fill the slots a route owns at level `li`. Slots written by a longer
    /// prefix keep their entry; slots delegating to a child chunk collect
    /// for re-insertion one level down.
    fn insert_leaf(
        &mut self,
        li: usize,
        idx: usize,
        level: u8,
        key: u128,
        prefix_len: u8,
        nexthop: u8,
    ) -> Result<(), InsertError> {
        let bits = self.levels[li].bits;
        let num_slots = 1usize << (bits - level);
        let mut pushed: Vec<u128> = Vec::new();
        for i in 0..num_slots {
            let level_data = &mut self.levels[li];
            if level_data.chunk_id[idx + i] != 0 {
                pushed.push(((key >> (128 - bits)) + i as u128) << (128 - bits));
            } else {
                if level_data.plen[idx + i] > prefix_len {
                    continue;
                }
                level_data.nexthop[idx + i] = nexthop;
                level_data.plen[idx + i] = prefix_len;
            }
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

    /// If the slot (`li`, `idx`) holds a next-hop, move it one level down
    /// so the slot can delegate to a child chunk.
    fn push_leaf(&mut self, li: usize, idx: usize, key: u128) -> Result<(), InsertError> {
        if self.levels[li].nexthop[idx] == 0 || li + 1 >= self.levels.len() {
            return Ok(());
        }
        let bits = self.levels[li].bits;
        let nexthop = self.levels[li].nexthop[idx];
        let plen = self.levels[li].plen[idx];
        self.levels[li].nexthop[idx] = 0;
        self.levels[li].plen[idx] = 0;
        let base = (key >> (128 - bits)) << (128 - bits);
        let (lo, hi) = half_keys(base, bits);
        self.insert_from(lo, plen, nexthop, bits + 1)?;
        self.insert_from(hi, plen, nexthop, bits + 1)
    }
}

impl Lpm for SailL {
    fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
        SailL::insert(self, prefix, prefix_len, nexthop)
    }

    fn lookup(&self, key: u128) -> u8 {
        SailL::lookup(self, key)
    }

    fn matched_prefix_len(&self, key: u128) -> u8 {
        SailL::matched_prefix_len(self, key)
    }

    fn mem_size(&self) -> usize {
        SailL::mem_size(self)
    }
}
