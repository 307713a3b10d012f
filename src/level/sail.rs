//! Uncompressed chunk level, shared by SAIL-U and SAIL-L.
//!
//! No bitmap: every stride value of a populated chunk has a slot in three
//! flat arrays, a next-hop, the prefix length that produced it, and the
//! 1-based id of the child chunk one level down (0 when none). Rank
//! addressing degenerates to `(chunk_id - 1) * CHUNK + stride`.

use crate::error::InsertError;

/// Stride values covered by one chunk (one 8-bit stride).
pub(crate) const CHUNK: usize = 256;

/// One stride layer of a SAIL table.
#[derive(Debug, Clone)]
pub(crate) struct SailLevel {
    /// Prefix-length boundary this level sits at.
    pub bits: u8,
    /// Next-hop per stride value (0 when the slot is unused).
    pub nexthop: Vec<u8>,
    /// Prefix length that wrote each next-hop.
    pub plen: Vec<u8>,
    /// 1-based child chunk id per stride value (0 when none).
    pub chunk_id: Vec<u32>,
    /// Chunks in use.
    pub count: u32,
}

impl SailLevel {
    pub(crate) fn new(bits: u8, chunks: u32) -> Self {
        let slots = chunks as usize * CHUNK;
        Self {
            bits,
            nexthop: vec![0; slots],
            plen: vec![0; slots],
            chunk_id: vec![0; slots],
            count: 0,
        }
    }

    pub(crate) fn chunk_capacity(&self) -> u32 {
        (self.nexthop.len() / CHUNK) as u32
    }

    pub(crate) fn slots_in_use(&self) -> usize {
        self.count as usize * CHUNK
    }

    /// Bytes of level storage in use. Lookup needs the next-hop and
    /// chunk-id arrays; the prefix-length array only serves insertion.
    pub(crate) fn mem_size(&self) -> usize {
        self.slots_in_use() * (1 + std::mem::size_of::<u32>())
    }

    /// Make room for a new chunk at 1-based `chunk_id`: shift the suffix of
    /// all three arrays one chunk right and zero the vacated chunk.
    pub(crate) fn insert_chunk(&mut self, chunk_id: u32) -> Result<(), InsertError> {
        debug_assert!(chunk_id >= 1 && chunk_id <= self.count + 1, "chunk id out of order");
        if self.count >= self.chunk_capacity() {
            log::error!("cannot insert chunk in level /{}: all {} chunks in use", self.bits, self.count);
            return Err(InsertError::LevelFull { bits: self.bits });
        }
        let start = (chunk_id - 1) as usize * CHUNK;
        let used = self.slots_in_use();
        self.nexthop.copy_within(start..used, start + CHUNK);
        self.plen.copy_within(start..used, start + CHUNK);
        self.chunk_id.copy_within(start..used, start + CHUNK);
        for slot in start..start + CHUNK {
            self.nexthop[slot] = 0;
            self.plen[slot] = 0;
            self.chunk_id[slot] = 0;
        }
        self.count += 1;
        Ok(())
    }

    /// The chunk id a new child below `idx` must take: one past the nearest
    /// id to the left, or 1 for the first chunk of the child level.
    fn next_chunk_id(&self, idx: usize) -> u32 {
        for i in (0..idx).rev() {
            if self.chunk_id[i] > 0 {
                return self.chunk_id[i] + 1;
            }
        }
        1
    }

    /// Record a newly inserted child chunk at `idx` and renumber every
    /// chunk id to the right.
    fn set_chunk_id(&mut self, idx: usize, chunk_id: u32) {
        debug_assert_eq!(self.chunk_id[idx], 0, "slot already has a child chunk");
        self.chunk_id[idx] = chunk_id;
        let used = self.slots_in_use();
        for id in self.chunk_id[idx + 1..used].iter_mut() {
            if *id > 0 {
                *id += 1;
            }
        }
    }
}

/// 1-based id of the child chunk below slot `idx` of level `li`, allocating
/// it in the next level if the slot has none yet.
pub(crate) fn chunk_for_child(
    levels: &mut [SailLevel],
    li: usize,
    idx: usize,
) -> Result<u32, InsertError> {
    debug_assert!(li + 1 < levels.len(), "the deepest level has no children");
    if levels[li].chunk_id[idx] == 0 {
        let chunk_id = levels[li].next_chunk_id(idx);
        let (parents, children) = levels.split_at_mut(li + 1);
        children[0].insert_chunk(chunk_id)?;
        parents[li].set_chunk_id(idx, chunk_id);
    }
    Ok(levels[li].chunk_id[idx])
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn chunk_ids_stay_ordered() {
        let mut levels = vec![SailLevel::new(16, 1), SailLevel::new(24, 4)];
        levels[0].count = 1;

        assert_eq!(chunk_for_child(&mut levels, 0, 200).unwrap(), 1);
        assert_eq!(chunk_for_child(&mut levels, 0, 100).unwrap(), 1);
        assert_eq!(chunk_for_child(&mut levels, 0, 150).unwrap(), 2);
        // earlier allocations got renumbered
        assert_eq!(levels[0].chunk_id[200], 3);
        assert_eq!(levels[1].count, 3);
        // resolving again allocates nothing
        assert_eq!(chunk_for_child(&mut levels, 0, 100).unwrap(), 1);
        assert_eq!(levels[1].count, 3);
    }

    #[test]
    fn insert_chunk_shifts_slots() {
        let mut level = SailLevel::new(24, 3);
        level.insert_chunk(1).unwrap();
        level.nexthop[0] = 9;
        level.plen[0] = 17;
        level.chunk_id[0] = 1;

        level.insert_chunk(1).unwrap();
        assert_eq!(level.nexthop[0], 0);
        assert_eq!(level.nexthop[CHUNK], 9);
        assert_eq!(level.plen[CHUNK], 17);
        assert_eq!(level.chunk_id[CHUNK], 1);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut level = SailLevel::new(32, 1);
        level.insert_chunk(1).unwrap();
        assert_eq!(level.insert_chunk(2), Err(InsertError::LevelFull { bits: 32 }));
    }
}
