//! Recovery Engine
//!
//! Repairs the corrupted blocks of one group by running the worklist to a
//! fixed point. Each corrupted block is rebuilt by XOR-folding one of its
//! redundancy sets, horizontal first because the row fold touches fewer
//! cross-row blocks, diagonal as the fallback. A set is usable only when
//! the block is its sole corrupted member; otherwise the block is parked in
//! the excluded set and requeued after the next successful repair, since
//! that repair may have made one of its sets usable.
//!
//! The fixed point terminates: every pass either shrinks the corrupt set or
//! moves a block to the excluded set, and a requeue only happens after a
//! repair. Anything still excluded at the end exceeds what row plus
//! diagonal parity can express, and the whole group read fails with
//! [`Error::UnrecoverableGroup`].

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::layout::dispatch::{BlockWrite, IoDispatcher};
use crate::parity::fold_set;

/// Fixed-point group repair over the redundancy sets of a [`Geometry`].
pub struct RecoveryEngine<'a> {
    geometry: &'a Geometry,
    /// Write repaired blocks back to their targets (best effort)
    store_recovery: bool,
}

impl<'a> RecoveryEngine<'a> {
    pub fn new(geometry: &'a Geometry, store_recovery: bool) -> Self {
        Self { geometry, store_recovery }
    }

    /// Rebuild every block of `corrupted` in place.
    ///
    /// `blocks` holds the full group in big-index order, with the corrupted
    /// slots zero-filled; on success they contain the reconstructed data.
    ///
    /// # Returns
    /// `Error::UnrecoverableGroup` when the fault pattern exceeds
    /// double-parity tolerance. Write-back failures are logged and never
    /// fail the recovery.
    #[instrument(skip(self, dispatcher, blocks), fields(corrupted = corrupted.len()))]
    pub async fn recover_group(
        &self,
        dispatcher: &mut IoDispatcher,
        group_offset: u64,
        blocks: &mut [Vec<u8>],
        corrupted: BTreeSet<usize>,
    ) -> Result<()> {
        if corrupted.is_empty() {
            return Ok(());
        }

        let mut corrupt = corrupted;
        let mut excluded: BTreeSet<usize> = BTreeSet::new();
        let mut repaired: Vec<usize> = Vec::new();

        while let Some(block) = corrupt.pop_first() {
            let usable = |set: &[usize]| {
                set.iter()
                    .all(|&m| m == block || (!corrupt.contains(&m) && !excluded.contains(&m)))
            };

            let set = self
                .geometry
                .horizontal_set(block)
                .filter(|s| usable(s))
                .or_else(|| self.geometry.diagonal_set(block).filter(|s| usable(s)));

            match set {
                Some(set) => {
                    let rebuilt = fold_set(blocks, &set, block, self.geometry.block_size());
                    blocks[block].copy_from_slice(&rebuilt);
                    repaired.push(block);
                    debug!(block, "rebuilt block");

                    // A repair can unblock previously excluded blocks.
                    corrupt.append(&mut excluded);
                }
                None => {
                    excluded.insert(block);
                }
            }
        }

        if !excluded.is_empty() {
            return Err(Error::UnrecoverableGroup { group_offset, remaining: excluded.len() });
        }

        if self.store_recovery && !repaired.is_empty() {
            let writes: Vec<BlockWrite> = repaired
                .iter()
                .map(|&block| BlockWrite {
                    stripe: self.geometry.stripe_of(block),
                    offset: self.geometry.block_offset(group_offset, block),
                    data: Bytes::from(blocks[block].clone()),
                })
                .collect();

            if let Err(err) = dispatcher.write_blocks(writes).await {
                warn!(group_offset, %err, "storing repaired blocks failed");
            }
        }

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
