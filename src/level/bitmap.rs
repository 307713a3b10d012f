//! Rank-indexed bitmap level, the CP-Trie encoding.
//!
//! Each 64-bit word carries a presence bitmap and the cumulative count of
//! presence bits before the word (its rank). For the leaf bitmap that count
//! runs across the whole engine: the shared leaf array is segmented level by
//! level, so a level's first rank continues from the last populated word of
//! its parent. For the child bitmap the count is per level, since child
//! chunk ids only index the next level down.
//!
//! The rank invariant: for every word with a non-empty bitmap and every bit
//! position b, `rank + popcnt_left(bitmap, b)` is the dense storage index of
//! the entry at b. Words with an all-zero bitmap carry no meaningful rank
//! and every reader skips them.

use super::popcnt_left;
use crate::error::InsertError;

/// Stride values covered by one chunk (4 words of 64).
pub(crate) const WORDS_PER_CHUNK: usize = 4;

/// The bit for stride value 0; value `v` within a word is `MSB >> v`.
pub(crate) const MSB: u64 = 1 << 63;

/// One 64-bit slice of a chunk: presence bits plus the cumulative
/// population count of all set bits strictly before this word.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BitmapNode {
    pub bitmap: u64,
    pub rank: u32,
}

impl BitmapNode {
    #[inline(always)]
    pub(crate) fn bit(&self, bit: u32) -> bool {
        self.bitmap & (MSB >> bit) != 0
    }

    /// Dense index of the entry at `bit`. Only meaningful when the bitmap
    /// is non-empty.
    #[inline(always)]
    pub(crate) fn index_of(&self, bit: u32) -> u32 {
        self.rank + popcnt_left(self.bitmap, bit)
    }
}

/// One stride layer of the CP-Trie: a leaf bitmap array and a child bitmap
/// array, both chunked, with a shared logical chunk count.
#[derive(Debug, Clone)]
pub(crate) struct BitmapLevel {
    /// Prefix-length boundary this level sits at.
    pub bits: u8,
    /// Presence of a leaf entry per stride value.
    pub leaf: Vec<BitmapNode>,
    /// Presence of a child chunk per stride value.
    pub child: Vec<BitmapNode>,
    /// Chunks in use.
    pub count: u32,
}

impl BitmapLevel {
    pub(crate) fn new(bits: u8, chunks: u32) -> Self {
        let words = chunks as usize * WORDS_PER_CHUNK;
        Self {
            bits,
            leaf: vec![BitmapNode::default(); words],
            child: vec![BitmapNode::default(); words],
            count: 0,
        }
    }

    pub(crate) fn chunk_capacity(&self) -> u32 {
        (self.leaf.len() / WORDS_PER_CHUNK) as u32
    }

    /// Words belonging to chunks in use.
    pub(crate) fn words_in_use(&self) -> usize {
        self.count as usize * WORDS_PER_CHUNK
    }

    /// Bytes of level storage in use: two node arrays over the populated
    /// chunks.
    pub(crate) fn mem_size(&self) -> usize {
        self.words_in_use() * std::mem::size_of::<BitmapNode>() * 2
    }

    /// Make room for a new chunk at 1-based `chunk_id`: shift the suffix of
    /// both arrays one chunk right, zero the vacated chunk and seed its
    /// ranks from the word immediately to the left.
    pub(crate) fn insert_chunk(&mut self, chunk_id: u32) -> Result<(), InsertError> {
        debug_assert!(chunk_id >= 1 && chunk_id <= self.count + 1, "chunk id out of order");
        if self.count >= self.chunk_capacity() {
            log::error!("cannot insert chunk in level /{}: all {} chunks in use", self.bits, self.count);
            return Err(InsertError::LevelFull { bits: self.bits });
        }
        let start = (chunk_id - 1) as usize * WORDS_PER_CHUNK;
        let used = self.words_in_use();
        self.leaf.copy_within(start..used, start + WORDS_PER_CHUNK);
        self.child.copy_within(start..used, start + WORDS_PER_CHUNK);
        let (leaf_rank, child_rank) = if chunk_id > 1 {
            (self.leaf[start - 1].rank, self.child[start - 1].rank)
        } else {
            (0, 0)
        };
        for word in start..start + WORDS_PER_CHUNK {
            self.leaf[word] = BitmapNode { bitmap: 0, rank: leaf_rank };
            self.child[word] = BitmapNode { bitmap: 0, rank: child_rank };
        }
        self.count += 1;
        Ok(())
    }
}

/// Dense child-chunk index for the stride position at (`idx`, `bit`),
/// derived from the level's own child bitmaps: the word itself when
/// populated, otherwise the nearest populated word to the left.
pub(crate) fn child_index(level: &BitmapLevel, idx: usize, bit: u32) -> u32 {
    let node = &level.child[idx];
    if node.bitmap != 0 {
        return node.index_of(bit);
    }
    for i in (0..idx).rev() {
        let node = &level.child[i];
        if node.bitmap != 0 {
            return node.rank + node.bitmap.count_ones();
        }
    }
    0
}

/// Rank a leaf word at (`li`, `idx`) would carry if populated: the count of
/// leaf bits before it, taken from the nearest populated word to the left,
/// falling back to the trailing words of each ancestor level.
pub(crate) fn leaf_rank_seed(levels: &[BitmapLevel], li: usize, idx: usize) -> u32 {
    for i in (0..idx).rev() {
        let node = &levels[li].leaf[i];
        if node.bitmap != 0 {
            return node.rank + node.bitmap.count_ones();
        }
    }
    for level in levels[..li].iter().rev() {
        for i in (0..level.words_in_use()).rev() {
            let node = &level.leaf[i];
            if node.bitmap != 0 {
                return node.rank + node.bitmap.count_ones();
            }
        }
    }
    0
}

/// Dense leaf index for the stride position at (`li`, `idx`, `bit`). For a
/// position whose bit is not set this is where its entry would be inserted.
pub(crate) fn leaf_index(levels: &[BitmapLevel], li: usize, idx: usize, bit: u32) -> u32 {
    let node = &levels[li].leaf[idx];
    if node.bitmap != 0 {
        return node.index_of(bit);
    }
    leaf_rank_seed(levels, li, idx)
}

/// Child chunk index below the stride position at (`li`, `idx`, `bit`),
/// allocating the chunk in the next level if the position has none yet.
///
/// Allocation keeps both invariants: the new chunk lands at the position its
/// address order demands (suffix of the child level shifts right), and every
/// populated child word to the right of (`idx`, `bit`) gains rank 1.
pub(crate) fn chunk_for_child(
    levels: &mut [BitmapLevel],
    li: usize,
    idx: usize,
    bit: u32,
) -> Result<u32, InsertError> {
    debug_assert!(li + 1 < levels.len(), "the deepest level has no children");
    if !levels[li].child[idx].bit(bit) {
        let chunk_id = child_index(&levels[li], idx, bit) + 1;
        let (parents, children) = levels.split_at_mut(li + 1);
        children[0].insert_chunk(chunk_id)?;
        let parent = &mut parents[li];
        // first bit of this word: seed the rank before setting it
        if parent.child[idx].bitmap == 0 {
            let mut rank = 0;
            for i in (0..idx).rev() {
                let node = &parent.child[i];
                if node.bitmap != 0 {
                    rank = node.rank + node.bitmap.count_ones();
                    break;
                }
            }
            parent.child[idx].rank = rank;
        }
        parent.child[idx].bitmap |= MSB >> bit;
        for i in idx + 1..parent.words_in_use() {
            if parent.child[i].bitmap != 0 {
                parent.child[i].rank += 1;
            }
        }
    }
    Ok(child_index(&levels[li], idx, bit))
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn insert_chunk_shifts_and_seeds() {
        let mut level = BitmapLevel::new(24, 4);
        level.insert_chunk(1).unwrap();
        level.leaf[0].bitmap = 0b11;
        level.leaf[3].rank = 2;
        level.leaf[3].bitmap = MSB;

        // new chunk 1 pushes the populated chunk right and seeds rank 0
        level.insert_chunk(1).unwrap();
        assert_eq!(level.count, 2);
        assert_eq!(level.leaf[0].bitmap, 0);
        assert_eq!(level.leaf[0].rank, 0);
        assert_eq!(level.leaf[4].bitmap, 0b11);

        // a chunk appended at the end seeds from its left neighbour
        level.insert_chunk(3).unwrap();
        assert_eq!(level.leaf[8].rank, 2);
    }

    #[test]
    fn insert_chunk_rejects_overflow() {
        let mut level = BitmapLevel::new(32, 1);
        level.insert_chunk(1).unwrap();
        assert_eq!(level.insert_chunk(2), Err(InsertError::LevelFull { bits: 32 }));
    }

    #[test]
    fn child_allocation_maintains_ranks() {
        // parent at /16 with one chunk, child at /24
        let mut levels = vec![BitmapLevel::new(16, 2), BitmapLevel::new(24, 4)];
        levels[0].count = 2;

        let first = chunk_for_child(&mut levels, 0, 3, 10).unwrap();
        assert_eq!(first, 0);
        assert_eq!(levels[1].count, 1);

        // a position to the left takes index 0 and shifts the first child
        let second = chunk_for_child(&mut levels, 0, 1, 5).unwrap();
        assert_eq!(second, 0);
        assert_eq!(chunk_for_child(&mut levels, 0, 3, 10).unwrap(), 1);
        assert_eq!(levels[1].count, 2);

        // re-resolving an existing position allocates nothing
        assert_eq!(chunk_for_child(&mut levels, 0, 1, 5).unwrap(), 0);
        assert_eq!(levels[1].count, 2);
    }

    #[test]
    fn leaf_index_falls_back_to_ancestors() {
        let mut levels = vec![BitmapLevel::new(16, 1), BitmapLevel::new(24, 1)];
        levels[0].count = 1;
        levels[1].count = 1;
        levels[0].leaf[2].bitmap = 0b111 << 32;
        levels[0].leaf[2].rank = 7;

        // empty child level continues after the parent's three bits
        assert_eq!(leaf_index(&levels, 1, 0, 0), 10);
        assert_eq!(leaf_rank_seed(&levels, 1, 3), 10);
    }
}
