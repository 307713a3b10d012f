//! This crate provides longest-prefix-match (LPM) lookup over 128-bit IPv6
//! keys, implemented four times over: two SAIL variants, a Poptrie, and a
//! compact trie (CP-Trie). All four build the same forwarding table from
//! (prefix, prefix-length, next-hop) routes and answer the same question,
//! which next-hop belongs to the longest stored prefix covering a key, but
//! they compress and address their trie levels differently:
//!
//! | Structure   | Level encoding                     | Leaf placement        |
//! |-------------|------------------------------------|-----------------------|
//! | [`SailU`]   | flat chunks, chunk-id chain        | every level           |
//! | [`SailL`]   | flat chunks, chunk-id chain        | leaf-pushed           |
//! | [`Poptrie`] | 64-ary nodes, per-node base offset | leaf-pushed, shared   |
//! | [`CpTrie`]  | bitmap words, cumulative rank      | leaf-pushed, shared   |
//!
//! Every variant implements [`Lpm`], so a caller can swap one structure for
//! another without touching the surrounding code. Insertion leaf-pushes
//! shorter prefixes ahead of longer ones, which is what keeps lookup a
//! single descent with no backtracking: the first level whose presence test
//! fails holds the answer.
//!
//! # Example
//!
//! ```
//! use lpm_trie::{CpTrie, Lpm, Poptrie, SailL, SailU};
//! use std::net::Ipv6Addr;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let key: u128 = "2001:db8::1".parse::<Ipv6Addr>()?.into();
//! let prefix: u128 = "2001:db8::".parse::<Ipv6Addr>()?.into();
//!
//! let mut tables: Vec<Box<dyn Lpm>> = vec![
//!     Box::new(SailU::new()),
//!     Box::new(SailL::new()),
//!     Box::new(Poptrie::new()),
//!     Box::new(CpTrie::new()),
//! ];
//! for table in tables.iter_mut() {
//!     table.insert(prefix, 32, 5)?;
//!     assert_eq!(table.lookup(key), 5);
//!     assert_eq!(table.matched_prefix_len(key), 32);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Capacity model
//!
//! Every structure is allocated once, at sizes given by its configuration
//! (`*Config` types), and never reallocates: inserting a route set that
//! does not fit fails with [`InsertError::LevelFull`] or
//! [`InsertError::LeafFull`] and leaves the table unusable. Size the
//! configuration for the expected table and rebuild when it grows past it.
//!
//! # Concurrency
//!
//! A table is a plain value: `insert` takes `&mut self` and performs
//! level-wide array shifts, `lookup` takes `&self`. Rust's borrow rules
//! give exactly the discipline the data structure needs (one writer, no
//! concurrent readers during a write). Independent tables are freely
//! parallel.

#![deny(missing_docs)]

mod dir;
mod error;
#[cfg(test)]
mod fuzzing;
mod leaf;
mod level;

pub mod cptrie;
pub mod fib;
pub mod poptrie;
pub mod sail_l;
pub mod sail_u;

pub use cptrie::{CpTrie, CpTrieConfig};
pub use error::{InitError, InsertError};
pub use poptrie::{Poptrie, PoptrieConfig};
pub use sail_l::SailL;
pub use sail_u::{SailConfig, SailU};

/// Common surface of the four lookup structures.
///
/// Next-hops are small non-zero identifiers (1..=255); 0 is reserved to
/// mean "no route" and doubles as the default next-hop of a table that
/// never saw a /0 route.
pub trait Lpm {
    /// Insert a route. A prefix length of 0 sets the table-wide default
    /// next-hop; bits of `prefix` below `prefix_len` are ignored.
    ///
    /// When two routes of equal length collide the later insert wins; a
    /// shorter route never replaces a longer one on any slot it covers.
    fn insert(&mut self, prefix: u128, prefix_len: u8, nexthop: u8) -> Result<(), InsertError>;

    /// Next-hop of the longest stored prefix matching `key`, or the default
    /// next-hop. Total: any 128-bit value is a valid key.
    fn lookup(&self, key: u128) -> u8;

    /// Length of the prefix [`lookup`](Self::lookup) would match for `key`,
    /// or 0 when only the default next-hop applies.
    fn matched_prefix_len(&self, key: u128) -> u8;

    /// Bytes of storage in use, for benchmarking.
    fn mem_size(&self) -> usize;
}

/// Prefix-length boundaries of the 16 + 8×14 stride schedule shared by the
/// SAIL variants and the CP-Trie.
pub(crate) const OCTET_BOUNDARIES: [u8; 15] =
    [16, 24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128];

/// Stride value consumed at level `li` of the octet schedule: the leading
/// 16 bits for level 0, one octet for every level below.
#[inline(always)]
pub(crate) fn octet_stride(key: u128, li: usize) -> u32 {
    if li == 0 {
        (key >> 112) as u32
    } else {
        ((key >> (112 - 8 * li)) & 0xff) as u32
    }
}

/// All-ones in the leading `len` bits.
#[inline(always)]
pub(crate) fn prefix_mask(len: u8) -> u128 {
    if len == 0 {
        0
    } else {
        u128::MAX << (128 - len)
    }
}

/// The two halves of the key space below a `bits`-long prefix: the prefix
/// itself and the prefix with bit `bits` set. Re-inserting an entry as
/// these two keys at granularity `bits + 1` moves it one level down.
#[inline(always)]
pub(crate) fn half_keys(prefix: u128, bits: u8) -> (u128, u128) {
    (prefix, prefix | 1u128 << (127 - bits))
}
