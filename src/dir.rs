//! Direct index over the first stride.
//!
//! Where the first stride is 16 bits wide, a flat array indexed by the
//! stride value beats a bitmap: one load replaces a rank computation. Each
//! slot holds the 1-based chunk id of the child chunk below that stride
//! value, or 0 when no child exists. Chunk ids stay dense and ordered, so
//! assigning one means scanning left for the nearest id and renumbering
//! everything to the right.

/// Flat stride-value to child-chunk-id table.
#[derive(Debug, Clone)]
pub(crate) struct DirectIndex {
    chunk_id: Vec<u32>,
}

impl DirectIndex {
    pub(crate) fn new(size: usize) -> Self {
        Self {
            chunk_id: vec![0; size],
        }
    }

    /// 1-based chunk id at `idx`, or 0 when the slot has no child.
    pub(crate) fn get(&self, idx: usize) -> u32 {
        self.chunk_id[idx]
    }

    /// The chunk id a new child at `idx` must take: one past the nearest id
    /// to the left, or 1 when this is the first chunk of the level.
    pub(crate) fn next_chunk_id(&self, idx: usize) -> u32 {
        for i in (0..idx).rev() {
            if self.chunk_id[i] > 0 {
                return self.chunk_id[i] + 1;
            }
        }
        1
    }

    /// Record a newly inserted chunk at `idx` and renumber every chunk id
    /// to the right, keeping address order and id order aligned.
    pub(crate) fn set_chunk_id(&mut self, idx: usize, chunk_id: u32) {
        debug_assert_eq!(self.chunk_id[idx], 0, "slot already has a child chunk");
        self.chunk_id[idx] = chunk_id;
        for id in self.chunk_id[idx + 1..].iter_mut() {
            if *id > 0 {
                *id += 1;
            }
        }
    }

    /// Bytes of storage. The table is flat and fully allocated, so this is
    /// independent of how many slots are populated.
    pub(crate) fn mem_size(&self) -> usize {
        self.chunk_id.len() * std::mem::size_of::<u32>()
    }
}
