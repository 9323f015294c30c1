//! Stripe Group Geometry
//!
//! Pure index arithmetic for the RAID-DP block grid. A group is a
//! conceptual rectangle of N rows by N + 2 columns: columns `0..N` hold
//! data, column `N` holds the row's simple parity and column `N + 1` the
//! double-parity slot owned by one of the diagonals. The grid is flattened
//! row-major into "big" indices `0..N² + 2N`; a second "small" index space
//! `0..N²` counts only the data blocks.
//!
//! Everything here is total, allocation is bounded by the fixed set sizes,
//! and no I/O happens. The write path and the recovery path share these
//! maps, which is what keeps the parity invariants and the reconstruction
//! sets consistent.
//!
//! The diagonal stepping rule (`jump = N + 3`, wrap `mod (totalBlocks - 1)`,
//! skip already-placed slots) is pinned by the unit tests against worked
//! N = 3 and N = 4 examples; do not simplify it without re-checking those.

#[cfg(test)]
mod proptest;

use crate::error::{Error, Result};

/// Immutable layout geometry for one striped file.
#[derive(Debug, Clone)]
pub struct Geometry {
    /// Number of data targets (N)
    data_stripes: usize,
    /// Total targets spanned by the layout (N + 2)
    total_stripes: usize,
    /// Bytes per block (W)
    block_size: usize,
    /// Data blocks per group (N²)
    data_blocks: usize,
    /// Data + parity blocks per group (N² + 2N)
    total_blocks: usize,
    /// Bytes of data per group (N² · W)
    group_size: u64,
    /// Bytes per grid row of data (N · W)
    line_size: u64,
}

impl Geometry {
    /// Create the geometry for `data_stripes` data targets and blocks of
    /// `block_size` bytes.
    pub fn new(data_stripes: usize, block_size: usize) -> Result<Self> {
        if data_stripes < 2 {
            return Err(Error::Config(format!(
                "stripe_count must be at least 2, got {}",
                data_stripes
            )));
        }

        if block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".to_string()));
        }

        let data_blocks = data_stripes * data_stripes;
        let w = block_size as u64;

        Ok(Self {
            data_stripes,
            total_stripes: data_stripes + 2,
            block_size,
            data_blocks,
            total_blocks: data_blocks + 2 * data_stripes,
            group_size: data_blocks as u64 * w,
            line_size: data_stripes as u64 * w,
        })
    }

    /// Number of data targets (N).
    pub fn data_stripes(&self) -> usize {
        self.data_stripes
    }

    /// Total number of targets (N + 2).
    pub fn total_stripes(&self) -> usize {
        self.total_stripes
    }

    /// Bytes per block (W).
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Data blocks per group (N²).
    pub fn data_blocks(&self) -> usize {
        self.data_blocks
    }

    /// Data + parity blocks per group (N² + 2N).
    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    /// Bytes of data per group (N² · W).
    pub fn group_size(&self) -> u64 {
        self.group_size
    }

    /// Bytes per row of data (N · W).
    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    fn w(&self) -> u64 {
        self.block_size as u64
    }

    // =========================================================================
    // Offset Translation
    // =========================================================================

    /// Start offset of the group containing `offset`.
    pub fn group_start(&self, offset: u64) -> u64 {
        (offset / self.group_size) * self.group_size
    }

    /// Convert a global file offset to `(logical stripe, local offset)`.
    ///
    /// The caller must split ranges at block boundaries first; a block never
    /// spans two stripes.
    pub fn local_position(&self, global_offset: u64) -> (usize, u64) {
        let stripe = ((global_offset / self.w()) % self.data_stripes as u64) as usize;
        let local = (global_offset / self.group_size) * self.line_size
            + ((global_offset % self.group_size) / self.line_size) * self.w()
            + (global_offset % self.w());
        (stripe, local)
    }

    /// Convert a `(logical stripe, local offset)` pair back to the global
    /// file offset. Inverse of [`local_position`](Self::local_position).
    pub fn global_position(&self, stripe: usize, local_offset: u64) -> u64 {
        (local_offset / self.line_size) * self.group_size
            + ((local_offset % self.line_size) / self.w()) * self.line_size
            + stripe as u64 * self.w()
            + (local_offset % self.w())
    }

    /// Offset of big-index `block` inside its target's data region for the
    /// group starting at `group_offset`. The per-target header is added by
    /// the I/O layer.
    pub fn block_offset(&self, group_offset: u64, block: usize) -> u64 {
        (group_offset / self.line_size) * self.w() + self.row_of(block) as u64 * self.w()
    }

    /// Physical per-target length for a logical file length:
    /// `ceil(len / groupBytes) · lineBytes`. The header is added by the
    /// caller.
    pub fn physical_stripe_length(&self, logical_length: u64) -> u64 {
        logical_length.div_ceil(self.group_size) * self.line_size
    }

    // =========================================================================
    // Grid Index Maps
    // =========================================================================

    /// Column of a big index, which is also its logical stripe.
    pub fn stripe_of(&self, block: usize) -> usize {
        block % self.total_stripes
    }

    /// Row of a big index.
    pub fn row_of(&self, block: usize) -> usize {
        block / self.total_stripes
    }

    /// Map a small (data-only) index to its big index.
    pub fn big_from_small(&self, small: usize) -> usize {
        debug_assert!(small < self.data_blocks, "small index out of range");
        (small / self.data_stripes) * self.total_stripes + small % self.data_stripes
    }

    /// Map a big index to its small index, or `None` for parity columns.
    pub fn small_from_big(&self, big: usize) -> Option<usize> {
        let col = big % self.total_stripes;

        if col >= self.data_stripes {
            return None;
        }

        Some((big / self.total_stripes) * self.data_stripes + col)
    }

    /// Big index of the simple parity block of `row`.
    pub fn row_parity_index(&self, row: usize) -> usize {
        row * self.total_stripes + self.data_stripes
    }

    /// Big index of the double-parity slot placed in `row`.
    pub fn diag_parity_index(&self, row: usize) -> usize {
        row * self.total_stripes + self.data_stripes + 1
    }

    /// Big indices of all simple parity blocks of a group.
    pub fn simple_parity_indices(&self) -> Vec<usize> {
        (0..self.data_stripes).map(|r| self.row_parity_index(r)).collect()
    }

    /// Big indices of all double-parity blocks of a group.
    pub fn double_parity_indices(&self) -> Vec<usize> {
        (0..self.data_stripes).map(|r| self.diag_parity_index(r)).collect()
    }

    fn is_double_parity(&self, block: usize) -> bool {
        block % self.total_stripes == self.data_stripes + 1
    }

    // =========================================================================
    // Redundancy Sets
    // =========================================================================

    /// The horizontal redundancy set of `block`: all blocks of its row
    /// except the double-parity slot. `None` for double-parity blocks,
    /// which have no row parity of their own.
    pub fn horizontal_set(&self, block: usize) -> Option<Vec<usize>> {
        if self.is_double_parity(block) {
            return None;
        }

        let base = self.row_of(block) * self.total_stripes;
        Some((0..self.total_stripes - 1).map(|i| base + i).collect())
    }

    /// The diagonal redundancy set of `block`: its N diagonal members
    /// (spanning data and simple-parity columns) plus the owning
    /// double-parity block. `None` when `block` lies on the omitted
    /// diagonal, whose parity is implied and never stored.
    ///
    /// The walk steps `jump = N + 3` through the flattened grid, wrapping
    /// `mod (totalBlocks - 1)` and stepping over double-parity slots; it is
    /// a port of the original construction and is validated against the
    /// worked examples in the tests, not derived.
    pub fn diagonal_set(&self, block: usize) -> Option<Vec<usize>> {
        let n = self.data_stripes;

        // The omitted diagonal is anchored at (row 0, column N).
        if block == n {
            return None;
        }

        let mut stripe = Vec::with_capacity(n + 1);
        stripe.push(block);

        // A double-parity start folds back to its diagonal's row-0 member.
        let mut dp_added = false;
        let mut prev = block;

        if self.is_double_parity(block) {
            prev = block % (n + 1);
            stripe.push(prev);
            dp_added = true;
        }

        let jump = n + 3;
        let last = self.total_blocks - 1;
        let mut min = prev;

        for _ in 0..n - 1 {
            let mut next = prev + jump;

            if next > last {
                next %= last;

                if next >= n + 1 {
                    next = (prev + jump) % jump;
                }
            } else if self.is_double_parity(next) {
                next = prev + 2;
            }

            if next == n {
                return None;
            }

            stripe.push(next);
            min = min.min(next);
            prev = next;
        }

        if !dp_added {
            // The owning double-parity block is determined by the smallest
            // member, which is always the diagonal's row-0 block.
            stripe.push((min + 1) * (n + 1) + min);
        }

        Some(stripe)
    }
}

// =============================================================================
// Tests
// =============================================================================
