//! Error types returned when building or filling a forwarding table.

use std::error::Error;
use std::fmt;

/// Errors returned when constructing an engine from an explicit
/// capacity configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A level or leaf capacity was configured as zero.
    ZeroCapacity,
    /// The top level must cover the full first stride (it is preallocated
    /// and never grows), so its chunk count is fixed.
    TopLevelChunks {
        /// The chunk count the top level requires.
        required: u32,
    },
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::ZeroCapacity => write!(f, "level and leaf capacities must be non-zero"),
            InitError::TopLevelChunks { required } => {
                write!(f, "the top level must be sized at exactly {required} chunks")
            }
        }
    }
}

impl Error for InitError {}

/// Errors returned by [`Lpm::insert`](crate::Lpm::insert).
///
/// The input errors (`InvalidNextHop`, `InvalidPrefixLength`) are detected
/// before any state is touched and the engine remains usable. The capacity
/// errors (`LevelFull`, `LeafFull`) mean a pre-sized array was too small for
/// the route set; they are fatal to the engine, which may be left with a
/// partially applied route and must be rebuilt with larger capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertError {
    /// Next-hop 0 is reserved to mean "no route".
    InvalidNextHop,
    /// The prefix length exceeds 128.
    InvalidPrefixLength(u8),
    /// The level at the given prefix-length boundary has no room for
    /// another chunk.
    LevelFull {
        /// Prefix-length boundary of the full level.
        bits: u8,
    },
    /// The shared leaf array has no room for the entries this route needs.
    LeafFull,
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InsertError::InvalidNextHop => write!(f, "next-hop 0 is reserved"),
            InsertError::InvalidPrefixLength(len) => {
                write!(f, "prefix length {len} is out of range (max 128)")
            }
            InsertError::LevelFull { bits } => {
                write!(f, "level /{bits} is full, increase its chunk capacity")
            }
            InsertError::LeafFull => write!(f, "leaf array is full, increase its capacity"),
        }
    }
}

impl Error for InsertError {}

/// Validate the caller-supplied route parameters. Called by every engine
/// before touching any state.
pub(crate) fn check_route(prefix_len: u8, nexthop: u8) -> Result<(), InsertError> {
    if nexthop == 0 {
        return Err(InsertError::InvalidNextHop);
    }
    if prefix_len > 128 {
        return Err(InsertError::InvalidPrefixLength(prefix_len));
    }
    Ok(())
}
