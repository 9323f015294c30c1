//! I/O Dispatcher
//!
//! Owns the stripe targets of one file and turns block-level requests into
//! batched asynchronous I/O. All requests of a batch are issued before any
//! is awaited, so per-target serialization (inside the target) is the only
//! ordering in effect.
//!
//! Failure handling is per block: a failed or timed-out read marks only the
//! affected big-index as corrupted, never the batch. A target that exceeds
//! the I/O timeout is closed and its slot replaced by `None` for the
//! remainder of the file instance; later requests against it fail
//! immediately without waiting.

use std::collections::BTreeSet;
use std::io;

use bytes::Bytes;
use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::error::{Error, Result};
use crate::geometry::Geometry;
use crate::target::StripeTarget;

/// One block-bounded read addressed by logical stripe and local data offset
/// (the per-target header is added by the dispatcher).
#[derive(Debug, Clone)]
pub struct ChunkRead {
    pub stripe: usize,
    pub offset: u64,
    pub len: usize,
}

/// One block-bounded write addressed the same way as [`ChunkRead`].
#[derive(Debug, Clone)]
pub struct BlockWrite {
    pub stripe: usize,
    pub offset: u64,
    pub data: Bytes,
}

/// Batched I/O front end over the stripe targets of one file.
pub struct IoDispatcher {
    /// Targets in physical order; `None` marks a target lost to a timeout
    targets: Vec<Option<Box<dyn StripeTarget>>>,
    /// Logical stripe index -> physical target index
    map: Vec<usize>,
    header_size: u64,
    io_timeout: std::time::Duration,
}

impl std::fmt::Debug for IoDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoDispatcher")
            .field("targets", &self.targets.len())
            .field("online", &self.online_targets())
            .field("map", &self.map)
            .field("header_size", &self.header_size)
            .field("io_timeout", &self.io_timeout)
            .finish()
    }
}

impl IoDispatcher {
    /// Wrap the physical target set described by `config`.
    pub fn new(targets: Vec<Box<dyn StripeTarget>>, config: &LayoutConfig) -> Result<Self> {
        if targets.len() != config.target_count() {
            return Err(Error::Config(format!(
                "layout spans {} targets, got {}",
                config.target_count(),
                targets.len()
            )));
        }

        Ok(Self {
            targets: targets.into_iter().map(Some).collect(),
            map: config.stripe_map(),
            header_size: config.header_size,
            io_timeout: config.io_timeout,
        })
    }

    /// Number of targets still answering requests.
    pub fn online_targets(&self) -> usize {
        self.targets.iter().filter(|t| t.is_some()).count()
    }

    fn physical(&self, stripe: usize) -> usize {
        self.map[stripe]
    }

    fn offline(target: usize) -> Error {
        Error::TargetIo {
            target,
            source: io::Error::new(io::ErrorKind::NotConnected, "target excluded after timeout"),
        }
    }

    fn attribute(err: Error, target: usize) -> Error {
        match err {
            Error::Io(source) => Error::TargetIo { target, source },
            other => other,
        }
    }

    /// Close and permanently drop every target that timed out in the batch
    /// just awaited.
    async fn exclude(&mut self, timed_out: &[usize]) {
        for &phys in timed_out {
            if let Some(target) = self.targets[phys].take() {
                warn!(target = phys, "excluding stripe target after timeout");

                if let Err(err) = target.close().await {
                    debug!(target = phys, %err, "close of timed-out target failed");
                }
            }
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Issue every read of `reqs` at once and await them together.
    ///
    /// Returns one result per request, in order. Timed-out targets are
    /// excluded before returning.
    pub async fn read_chunks(&mut self, reqs: &[ChunkRead]) -> Vec<Result<Bytes>> {
        let io_timeout = self.io_timeout;
        let header = self.header_size;

        let results = join_all(reqs.iter().map(|req| {
            let phys = self.physical(req.stripe);
            let slot = self.targets[phys].as_deref();

            async move {
                let target = match slot {
                    Some(target) => target,
                    None => return Err(Self::offline(phys)),
                };

                match timeout(io_timeout, target.read_at(header + req.offset, req.len, true)).await
                {
                    Ok(result) => result.map_err(|e| Self::attribute(e, phys)),
                    Err(_) => Err(Error::TargetTimeout { target: phys, timeout: io_timeout }),
                }
            }
        }))
        .await;

        let timed_out: Vec<usize> = reqs
            .iter()
            .zip(&results)
            .filter(|(_, r)| matches!(r, Err(e) if e.is_timeout()))
            .map(|(req, _)| self.physical(req.stripe))
            .collect();
        self.exclude(&timed_out).await;

        results
    }

    /// Read every block of the group at `group_offset`, parity included.
    ///
    /// Returns the block contents in big-index order plus the set of
    /// big-indices whose read failed (their slots are zero-filled).
    pub async fn read_group(
        &mut self,
        geometry: &Geometry,
        group_offset: u64,
    ) -> (Vec<Vec<u8>>, BTreeSet<usize>) {
        let w = geometry.block_size();
        let reqs: Vec<ChunkRead> = (0..geometry.total_blocks())
            .map(|block| ChunkRead {
                stripe: geometry.stripe_of(block),
                offset: geometry.block_offset(group_offset, block),
                len: w,
            })
            .collect();

        let results = self.read_chunks(&reqs).await;

        let mut blocks = vec![vec![0u8; w]; geometry.total_blocks()];
        let mut corrupted = BTreeSet::new();

        for (block, result) in results.into_iter().enumerate() {
            match result {
                Ok(bytes) => blocks[block].copy_from_slice(&bytes),
                Err(err) => {
                    warn!(block, group_offset, %err, "block read failed, marking corrupted");
                    corrupted.insert(block);
                }
            }
        }

        (blocks, corrupted)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Issue every write of `writes` at once and await them together.
    ///
    /// All writes are attempted even when some fail; the first error is
    /// returned afterwards. A completion shorter than the payload surfaces
    /// as [`Error::ShortWrite`] and is never retried.
    pub async fn write_blocks(&mut self, writes: Vec<BlockWrite>) -> Result<()> {
        let io_timeout = self.io_timeout;
        let header = self.header_size;

        let results = join_all(writes.iter().map(|wr| {
            let phys = self.physical(wr.stripe);
            let slot = self.targets[phys].as_deref();
            let data = wr.data.clone();

            async move {
                let target = match slot {
                    Some(target) => target,
                    None => return Err(Self::offline(phys)),
                };

                let expected = data.len();
                match timeout(io_timeout, target.write_at(header + wr.offset, data)).await {
                    Ok(Ok(written)) if written == expected => Ok(()),
                    Ok(Ok(written)) => Err(Error::ShortWrite { target: phys, written, expected }),
                    Ok(Err(e)) => Err(Self::attribute(e, phys)),
                    Err(_) => Err(Error::TargetTimeout { target: phys, timeout: io_timeout }),
                }
            }
        }))
        .await;

        let timed_out: Vec<usize> = writes
            .iter()
            .zip(&results)
            .filter(|(_, r)| matches!(r, Err(e) if e.is_timeout()))
            .map(|(wr, _)| self.physical(wr.stripe))
            .collect();
        self.exclude(&timed_out).await;

        let mut first_error = None;

        for (wr, result) in writes.iter().zip(results) {
            if let Err(err) = result {
                warn!(stripe = wr.stripe, offset = wr.offset, %err, "block write failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Sizing and Teardown
    // =========================================================================

    /// Truncate every online target to `physical_len` data bytes (plus the
    /// header). Entry-server path of the truncate fan-out.
    pub async fn truncate_all(&mut self, physical_len: u64) -> Result<()> {
        let header = self.header_size;

        let results = join_all(
            self.targets
                .iter()
                .flatten()
                .map(|t| t.truncate(header + physical_len)),
        )
        .await;

        results.into_iter().collect()
    }

    /// Truncate only the locally attached target (physical index 0); the
    /// path a non-entry instance takes.
    pub async fn truncate_local(&mut self, physical_len: u64) -> Result<()> {
        match self.targets[0].as_deref() {
            Some(target) => target.truncate(self.header_size + physical_len).await,
            None => Err(Self::offline(0)),
        }
    }

    /// Pre-allocate `physical_len` data bytes (plus the header) on every
    /// online target.
    pub async fn fallocate_all(&mut self, physical_len: u64) -> Result<()> {
        let header = self.header_size;

        let results = join_all(
            self.targets
                .iter()
                .flatten()
                .map(|t| t.fallocate(header + physical_len)),
        )
        .await;

        results.into_iter().collect()
    }

    /// Close every remaining target, releasing the slots. All closes are
    /// attempted; the first error is returned.
    pub async fn close_all(&mut self) -> Result<()> {
        let targets: Vec<_> = self.targets.iter_mut().filter_map(Option::take).collect();
        let results = join_all(targets.iter().map(|t| t.close())).await;

        results.into_iter().collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::target::MemoryTarget;

    fn config(n: usize, w: usize) -> LayoutConfig {
        LayoutConfig::new(n, w)
    }

    fn memory_set(count: usize) -> (Vec<Arc<MemoryTarget>>, Vec<Box<dyn StripeTarget>>) {
        let handles: Vec<Arc<MemoryTarget>> =
            (0..count).map(|_| Arc::new(MemoryTarget::new())).collect();
        let boxed = handles
            .iter()
            .map(|t| Box::new(Arc::clone(t)) as Box<dyn StripeTarget>)
            .collect();
        (handles, boxed)
    }

    #[tokio::test]
    async fn test_read_group_marks_corrupted() {
        let cfg = config(2, 8);
        let geo = Geometry::new(2, 8).expect("valid geometry");
        let (handles, boxed) = memory_set(cfg.target_count());
        let mut dispatcher = IoDispatcher::new(boxed, &cfg).expect("dispatcher");

        for (i, h) in handles.iter().enumerate() {
            h.write_at(0, Bytes::from(vec![i as u8 + 1; 16])).await.expect("seed");
        }

        // Target 1 loses its first block.
        handles[1].fail_reads_in(0..8).await;

        let (blocks, corrupted) = dispatcher.read_group(&geo, 0).await;
        assert_eq!(corrupted.into_iter().collect::<Vec<_>>(), vec![1]);
        assert_eq!(blocks[0], vec![1u8; 8]);
        assert_eq!(blocks[1], vec![0u8; 8]);
        assert_eq!(blocks[5], vec![2u8; 8]);
    }

    #[tokio::test]
    async fn test_short_write_is_fatal() {
        let cfg = config(2, 8);
        let (handles, boxed) = memory_set(cfg.target_count());
        let mut dispatcher = IoDispatcher::new(boxed, &cfg).expect("dispatcher");

        handles[2].short_writes().await;

        let writes = vec![
            BlockWrite { stripe: 0, offset: 0, data: Bytes::from(vec![1u8; 8]) },
            BlockWrite { stripe: 2, offset: 0, data: Bytes::from(vec![2u8; 8]) },
        ];
        assert_matches!(
            dispatcher.write_blocks(writes).await,
            Err(Error::ShortWrite { target: 2, written: 4, expected: 8 })
        );

        // The healthy write of the batch still went through.
        assert_eq!(handles[0].len().await, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_excludes_target() {
        let mut cfg = config(2, 8);
        cfg.io_timeout = Duration::from_millis(50);
        let geo = Geometry::new(2, 8).expect("valid geometry");
        let (handles, boxed) = memory_set(cfg.target_count());
        let mut dispatcher = IoDispatcher::new(boxed, &cfg).expect("dispatcher");

        handles[3].hang_reads().await;

        let (_, corrupted) = dispatcher.read_group(&geo, 0).await;
        // Stripe 3 holds blocks 3 and 7 of the N=2 grid.
        assert_eq!(corrupted.into_iter().collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(dispatcher.online_targets(), 3);

        // The excluded slot now fails immediately, no timer involved.
        let reqs = vec![ChunkRead { stripe: 3, offset: 0, len: 8 }];
        let results = dispatcher.read_chunks(&reqs).await;
        assert_matches!(&results[0], Err(Error::TargetIo { target: 3, .. }));
    }

    #[tokio::test]
    async fn test_stripe_map_indirection() {
        let mut cfg = config(2, 8);
        cfg.logical_to_physical = vec![3, 2, 1, 0];
        let (handles, boxed) = memory_set(cfg.target_count());
        let mut dispatcher = IoDispatcher::new(boxed, &cfg).expect("dispatcher");

        let writes =
            vec![BlockWrite { stripe: 0, offset: 0, data: Bytes::from_static(b"stripe 0") }];
        dispatcher.write_blocks(writes).await.expect("write");

        // Logical stripe 0 lands on physical target 3.
        assert_eq!(handles[3].len().await, 8);
        assert!(handles[0].is_empty().await);
    }

    #[tokio::test]
    async fn test_debug_reports_online_slots() {
        let cfg = config(2, 8);
        let (_, boxed) = memory_set(cfg.target_count());
        let dispatcher = IoDispatcher::new(boxed, &cfg).expect("dispatcher");

        let rendered = format!("{:?}", dispatcher);
        assert!(rendered.contains("online: 4"), "unexpected debug output: {}", rendered);
    }

    #[tokio::test]
    async fn test_wrong_target_count_rejected() {
        let cfg = config(3, 8);
        let (_, boxed) = memory_set(4);
        assert_matches!(IoDispatcher::new(boxed, &cfg), Err(Error::Config(_)));
    }
}
