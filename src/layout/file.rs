//! Layout Façade
//!
//! `RaidDpFile` is the one object callers touch: byte-range reads and
//! writes against the logical file, truncate/preallocate fan-out and the
//! closing flush. It owns the geometry, the dispatcher and the group
//! buffer; exactly one operation runs at a time (methods take `&mut self`).
//!
//! The read path is optimistic: it fetches only the blocks the request
//! touches and falls back to a full group read plus recovery for every
//! group where a chunk failed. The write path sends data blocks straight
//! to their targets while accumulating them in the group buffer; parity is
//! computed and flushed whenever a group completes, and once more at close
//! for the zero-padded trailing group.

use std::collections::BTreeSet;

use bytes::Bytes;
use tracing::{debug, info, instrument, warn};

use crate::config::LayoutConfig;
use crate::error::Result;
use crate::geometry::Geometry;
use crate::layout::dispatch::{BlockWrite, ChunkRead, IoDispatcher};
use crate::layout::group::GroupBuffer;
use crate::layout::recovery::RecoveryEngine;
use crate::parity::compute_group_parity;
use crate::target::StripeTarget;

/// One open RAID-DP striped file.
pub struct RaidDpFile {
    config: LayoutConfig,
    geometry: Geometry,
    dispatcher: IoDispatcher,
    group: GroupBuffer,
}

/// A request split into block-bounded pieces; `out_pos` is where the piece
/// lands in the caller's buffer.
struct Piece {
    global_offset: u64,
    len: usize,
    out_pos: usize,
}

impl RaidDpFile {
    /// Open the file over the given physical target set.
    ///
    /// # Arguments
    /// * `config` - Validated against the layout invariants
    /// * `targets` - Exactly N + 2 targets, in physical order
    pub fn open(config: LayoutConfig, targets: Vec<Box<dyn StripeTarget>>) -> Result<Self> {
        config.validate()?;

        let geometry = Geometry::new(config.stripe_count, config.block_size)?;
        let dispatcher = IoDispatcher::new(targets, &config)?;
        let group = GroupBuffer::new(&geometry);

        info!(
            stripes = config.stripe_count,
            block_size = config.block_size,
            "opened striped file"
        );

        Ok(Self { config, geometry, dispatcher, group })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Number of targets still answering requests.
    pub fn online_targets(&self) -> usize {
        self.dispatcher.online_targets()
    }

    fn split(&self, offset: u64, len: usize) -> Vec<Piece> {
        let w = self.geometry.block_size() as u64;
        let mut pieces = Vec::new();
        let mut global = offset;
        let mut out_pos = 0usize;

        while out_pos < len {
            let in_block = (global % w) as usize;
            let take = (self.geometry.block_size() - in_block).min(len - out_pos);
            pieces.push(Piece { global_offset: global, len: take, out_pos });
            global += take as u64;
            out_pos += take;
        }

        pieces
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Read `length` bytes at `offset`, transparently repairing corrupted
    /// groups. Ranges past the written extent read as zeroes.
    #[instrument(skip(self))]
    pub async fn read(&mut self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let pieces = self.split(offset, length);
        let reqs: Vec<ChunkRead> = pieces
            .iter()
            .map(|p| {
                let (stripe, local) = self.geometry.local_position(p.global_offset);
                ChunkRead { stripe, offset: local, len: p.len }
            })
            .collect();

        let results = self.dispatcher.read_chunks(&reqs).await;

        let mut out = vec![0u8; length];
        let mut degraded_groups: BTreeSet<u64> = BTreeSet::new();

        for (piece, result) in pieces.iter().zip(results) {
            match result {
                Ok(bytes) => out[piece.out_pos..piece.out_pos + piece.len].copy_from_slice(&bytes),
                Err(err) => {
                    let group = self.geometry.group_start(piece.global_offset);
                    debug!(offset = piece.global_offset, %err, "chunk read failed, group needs recovery");
                    degraded_groups.insert(group);
                }
            }
        }

        for group_offset in degraded_groups {
            let (mut blocks, corrupted) =
                self.dispatcher.read_group(&self.geometry, group_offset).await;

            RecoveryEngine::new(&self.geometry, self.config.store_recovery)
                .recover_group(&mut self.dispatcher, group_offset, &mut blocks, corrupted)
                .await?;

            // Serve every piece of this group from the repaired blocks.
            let w = self.geometry.block_size() as u64;
            for piece in pieces.iter().filter(|p| self.geometry.group_start(p.global_offset) == group_offset) {
                let small = ((piece.global_offset - group_offset) / w) as usize;
                let big = self.geometry.big_from_small(small);
                let in_block = (piece.global_offset % w) as usize;

                out[piece.out_pos..piece.out_pos + piece.len]
                    .copy_from_slice(&blocks[big][in_block..in_block + piece.len]);
            }
        }

        Ok(out)
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Write `data` at `offset`.
    ///
    /// Data blocks go straight to their targets; parity for each group is
    /// flushed as soon as the group's last data block has been absorbed.
    /// Any target error on the write path is fatal for the call.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn write(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let pieces = self.split(offset, data.len());
        let mut writes = Vec::with_capacity(pieces.len());

        for piece in &pieces {
            let group = self.geometry.group_start(piece.global_offset);

            if self.group.group_offset() != Some(group) {
                self.flush_group_parity().await?;
                self.group.begin(group);
            }

            let chunk = &data[piece.out_pos..piece.out_pos + piece.len];
            self.group.absorb(piece.global_offset, chunk);

            let (stripe, local) = self.geometry.local_position(piece.global_offset);
            writes.push(BlockWrite { stripe, offset: local, data: Bytes::copy_from_slice(chunk) });

            if self.group.is_complete() {
                self.flush_group_parity().await?;
            }
        }

        self.dispatcher.write_blocks(writes).await?;
        Ok(data.len())
    }

    /// Compute and flush the parity of the buffered group, then return the
    /// buffer to idle. No-op when nothing has been absorbed.
    async fn flush_group_parity(&mut self) -> Result<()> {
        let Some(group_offset) = self.group.group_offset() else {
            return Ok(());
        };

        if self.group.is_empty() {
            self.group.clear();
            return Ok(());
        }

        compute_group_parity(&self.geometry, self.group.blocks_mut());

        let n = self.geometry.data_stripes();
        let mut writes = Vec::with_capacity(2 * n);

        for row in 0..n {
            let simple = self.geometry.row_parity_index(row);
            let double = self.geometry.diag_parity_index(row);
            let offset = self.geometry.block_offset(group_offset, simple);

            // Row k of both parity columns sits at block k of the group
            // region on the parity targets (logical stripes N and N + 1).
            writes.push(BlockWrite {
                stripe: n,
                offset,
                data: Bytes::from(self.group.blocks()[simple].clone()),
            });
            writes.push(BlockWrite {
                stripe: n + 1,
                offset,
                data: Bytes::from(self.group.blocks()[double].clone()),
            });
        }

        debug!(group_offset, "flushing group parity");
        self.dispatcher.write_blocks(writes).await?;
        self.group.clear();
        Ok(())
    }

    // =========================================================================
    // Sizing and Shutdown
    // =========================================================================

    /// Truncate the logical file to `length` bytes.
    ///
    /// The entry server fans the converted per-target length out to every
    /// target; a non-entry instance resizes only its local target.
    #[instrument(skip(self))]
    pub async fn truncate(&mut self, length: u64) -> Result<()> {
        let physical = self.geometry.physical_stripe_length(length);

        if self.config.is_entry_server {
            self.dispatcher.truncate_all(physical).await
        } else {
            self.dispatcher.truncate_local(physical).await
        }
    }

    /// Reserve space for a logical file of `length` bytes on every target.
    #[instrument(skip(self))]
    pub async fn preallocate(&mut self, length: u64) -> Result<()> {
        let physical = self.geometry.physical_stripe_length(length);
        self.dispatcher.fallocate_all(physical).await
    }

    /// Flush the trailing group's parity (zero-padded) and release all
    /// targets.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        if let Err(err) = self.flush_group_parity().await {
            warn!(%err, "trailing parity flush failed");
            self.dispatcher.close_all().await?;
            return Err(err);
        }

        self.dispatcher.close_all().await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::parity::xor_blocks;
    use crate::target::{MemoryTarget, StripeTarget};

    fn open_memory(n: usize, w: usize) -> (Vec<Arc<MemoryTarget>>, RaidDpFile) {
        let config = LayoutConfig::new(n, w);
        let handles: Vec<Arc<MemoryTarget>> =
            (0..config.target_count()).map(|_| Arc::new(MemoryTarget::new())).collect();
        let targets = handles
            .iter()
            .map(|t| Box::new(Arc::clone(t)) as Box<dyn StripeTarget>)
            .collect();
        let file = RaidDpFile::open(config, targets).expect("open");
        (handles, file)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn test_data_lands_round_robin() {
        let (handles, mut file) = open_memory(3, 16);
        let data = pattern(3 * 16);

        file.write(0, &data).await.expect("write");

        // One line: block k of the file goes to target k.
        for stripe in 0..3 {
            let read = handles[stripe].read_at(0, 16, false).await.expect("read");
            assert_eq!(&read[..], &data[stripe * 16..(stripe + 1) * 16]);
        }
    }

    #[tokio::test]
    async fn test_group_boundary_flushes_parity() {
        let (handles, mut file) = open_memory(2, 8);
        let group = file.geometry().group_size() as usize;
        let data = pattern(group);

        file.write(0, &data).await.expect("write");

        // Row 0 simple parity = block 0 XOR block 1 of the file.
        let mut expect = vec![0u8; 8];
        xor_blocks(&data[0..8], &data[8..16], &mut expect);
        let parity = handles[2].read_at(0, 8, false).await.expect("read");
        assert_eq!(&parity[..], &expect[..]);

        // Double parity column got both rows as well.
        assert_eq!(handles[3].len().await, 16);
    }

    #[tokio::test]
    async fn test_close_flushes_partial_group() {
        let (handles, mut file) = open_memory(2, 8);

        // Half a group: only file block 0 written.
        let data = pattern(8);
        file.write(0, &data).await.expect("write");
        assert!(handles[2].is_empty().await);

        file.close().await.expect("close");

        // Zero-padded parity: row 0 parity equals block 0, row 1 is zero.
        let parity = handles[2].read_at(0, 16, false).await.expect("read");
        assert_eq!(&parity[..8], &data[..]);
        assert_eq!(&parity[8..], &[0u8; 8]);
    }

    #[tokio::test]
    async fn test_unaligned_write_read_roundtrip() {
        let (_, mut file) = open_memory(3, 16);
        let data = pattern(200);

        // Two calls with an unaligned split.
        file.write(0, &data[..77]).await.expect("write");
        file.write(77, &data[77..]).await.expect("write");

        let read = file.read(0, 200).await.expect("read");
        assert_eq!(read, data);

        // Unaligned sub-range too.
        let read = file.read(33, 60).await.expect("read");
        assert_eq!(read, &data[33..93]);
    }

    #[tokio::test]
    async fn test_truncate_fans_out() {
        let (handles, mut file) = open_memory(3, 16);
        let group = file.geometry().group_size();
        let line = file.geometry().line_size();

        file.truncate(group + 1).await.expect("truncate");

        for handle in &handles {
            assert_eq!(handle.len().await as u64, 2 * line);
        }
    }

    #[tokio::test]
    async fn test_non_entry_truncate_is_local() {
        let mut config = LayoutConfig::new(3, 16);
        config.is_entry_server = false;

        let handles: Vec<Arc<MemoryTarget>> =
            (0..config.target_count()).map(|_| Arc::new(MemoryTarget::new())).collect();
        let targets = handles
            .iter()
            .map(|t| Box::new(Arc::clone(t)) as Box<dyn StripeTarget>)
            .collect();
        let mut file = RaidDpFile::open(config, targets).expect("open");

        file.truncate(100).await.expect("truncate");

        let line = file.geometry().line_size();
        assert_eq!(handles[0].len().await as u64, line);
        assert!(handles[1].is_empty().await);
    }
}
