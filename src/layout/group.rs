//! Group Buffer
//!
//! Accumulates the data blocks of the group currently being written so that
//! parity can be computed once the group is full (or zero-padded at close).
//! Holds all N² + 2N blocks of one group; only the data slots are filled by
//! the write path, the parity slots are produced in place by the parity
//! engine right before the flush.
//!
//! The buffer is idle (`group_offset() == None`) between groups and is
//! re-zeroed on every [`begin`](GroupBuffer::begin), which is what makes the
//! trailing partial group's parity come out as if the missing data were
//! zeroes.

use crate::geometry::Geometry;

/// Block accumulator for the group currently being written.
pub struct GroupBuffer {
    geometry: Geometry,
    blocks: Vec<Vec<u8>>,
    group_offset: Option<u64>,
    filled: u64,
}

impl GroupBuffer {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            blocks: vec![vec![0u8; geometry.block_size()]; geometry.total_blocks()],
            geometry: geometry.clone(),
            group_offset: None,
            filled: 0,
        }
    }

    /// Start offset of the group being accumulated, `None` when idle.
    pub fn group_offset(&self) -> Option<u64> {
        self.group_offset
    }

    /// Whether no data has been absorbed since the last `begin`/`clear`.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Whether all N² data blocks of the active group have been absorbed.
    ///
    /// Assumes the chunks of a group do not overlap, which holds for the
    /// block-bounded split the write path produces.
    pub fn is_complete(&self) -> bool {
        self.group_offset.is_some() && self.filled == self.geometry.group_size()
    }

    /// Activate the buffer for the group starting at `group_offset`,
    /// zeroing every block.
    pub fn begin(&mut self, group_offset: u64) {
        debug_assert_eq!(
            group_offset % self.geometry.group_size(),
            0,
            "group offset must be group-aligned"
        );

        for block in &mut self.blocks {
            block.fill(0);
        }

        self.group_offset = Some(group_offset);
        self.filled = 0;
    }

    /// Copy one block-bounded chunk of file data into its data block.
    pub fn absorb(&mut self, global_offset: u64, data: &[u8]) {
        let group = self.geometry.group_start(global_offset);
        debug_assert_eq!(Some(group), self.group_offset, "chunk outside the active group");

        let w = self.geometry.block_size() as u64;
        let in_block = (global_offset % w) as usize;
        debug_assert!(
            in_block + data.len() <= self.geometry.block_size(),
            "chunk crosses a block boundary"
        );

        let small = ((global_offset - group) / w) as usize;
        let big = self.geometry.big_from_small(small);

        self.blocks[big][in_block..in_block + data.len()].copy_from_slice(data);
        self.filled += data.len() as u64;
    }

    pub fn blocks(&self) -> &[Vec<u8>] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Vec<u8>] {
        &mut self.blocks
    }

    /// Return the buffer to the idle state. Blocks are re-zeroed by the
    /// next `begin`.
    pub fn clear(&mut self) {
        self.group_offset = None;
        self.filled = 0;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_to_completion() {
        let geo = Geometry::new(3, 16).expect("valid geometry");
        let mut buf = GroupBuffer::new(&geo);
        assert_eq!(buf.group_offset(), None);

        buf.begin(0);
        assert!(buf.is_empty());
        assert!(!buf.is_complete());

        for block in 0..geo.data_blocks() {
            let data = vec![block as u8; geo.block_size()];
            buf.absorb(block as u64 * 16, &data);
        }
        assert!(buf.is_complete());

        // Data landed on the big-index grid, parity slots untouched.
        assert_eq!(buf.blocks()[geo.big_from_small(4)], vec![4u8; 16]);
        assert_eq!(buf.blocks()[geo.row_parity_index(0)], vec![0u8; 16]);
    }

    #[test]
    fn test_begin_rezeros() {
        let geo = Geometry::new(2, 8).expect("valid geometry");
        let mut buf = GroupBuffer::new(&geo);

        buf.begin(0);
        buf.absorb(0, &[0xFFu8; 8]);
        buf.clear();

        buf.begin(geo.group_size());
        assert!(buf.is_empty());
        assert!(buf.blocks().iter().all(|b| b.iter().all(|&x| x == 0)));
    }

    #[test]
    fn test_partial_chunk_placement() {
        let geo = Geometry::new(3, 16).expect("valid geometry");
        let mut buf = GroupBuffer::new(&geo);

        // Second group, offset into the middle of file block 4 (stripe 1,
        // row 1 of the grid).
        let base = geo.group_size();
        buf.begin(base);
        buf.absorb(base + 4 * 16 + 3, b"abc");

        let big = geo.big_from_small(4);
        assert_eq!(&buf.blocks()[big][3..6], b"abc");
        assert!(!buf.is_complete());
    }
}
