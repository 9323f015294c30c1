//! In-Memory Stripe Target
//!
//! Mock target used by the unit and integration tests: a growable byte
//! vector plus a fault plan that can fail reads in chosen ranges, fail
//! everything, produce short writes or hang until the dispatcher's timeout
//! fires. Production I/O goes through [`FileTarget`](super::FileTarget) or
//! a remote implementation of the port.

use std::io;
use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::target::StripeTarget;

#[derive(Debug, Default)]
struct FaultPlan {
    /// Byte ranges whose reads fail with an injected I/O error
    fail_read_ranges: Vec<Range<u64>>,
    /// Fail every read
    fail_all_reads: bool,
    /// Fail every write
    fail_writes: bool,
    /// Complete writes with half the requested length
    short_writes: bool,
    /// Never complete reads; lets the dispatcher's timeout fire
    hang_reads: bool,
}

/// Stripe target backed by process memory, with fault injection.
#[derive(Default)]
pub struct MemoryTarget {
    data: Mutex<Vec<u8>>,
    faults: Mutex<FaultPlan>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject read failures for the given byte range.
    pub async fn fail_reads_in(&self, range: Range<u64>) {
        self.faults.lock().await.fail_read_ranges.push(range);
    }

    /// Fail every subsequent read.
    pub async fn fail_all_reads(&self) {
        self.faults.lock().await.fail_all_reads = true;
    }

    /// Fail every subsequent write.
    pub async fn fail_writes(&self) {
        self.faults.lock().await.fail_writes = true;
    }

    /// Complete subsequent writes short.
    pub async fn short_writes(&self) {
        self.faults.lock().await.short_writes = true;
    }

    /// Hang subsequent reads until cancelled by the caller's timeout.
    pub async fn hang_reads(&self) {
        self.faults.lock().await.hang_reads = true;
    }

    /// Clear all injected faults.
    pub async fn heal(&self) {
        *self.faults.lock().await = FaultPlan::default();
    }

    /// Current stored length, for test assertions.
    pub async fn len(&self) -> usize {
        self.data.lock().await.len()
    }

    /// Whether nothing has been written yet.
    pub async fn is_empty(&self) -> bool {
        self.data.lock().await.is_empty()
    }

    fn injected(kind: &str) -> Error {
        Error::Io(io::Error::other(format!("injected {} fault", kind)))
    }
}

#[async_trait]
impl StripeTarget for MemoryTarget {
    async fn read_at(&self, offset: u64, len: usize, _readahead: bool) -> Result<Bytes> {
        {
            let faults = self.faults.lock().await;

            if faults.hang_reads {
                drop(faults);
                futures::future::pending::<()>().await;
                unreachable!("pending future completed");
            }

            if faults.fail_all_reads {
                return Err(Self::injected("read"));
            }

            let end = offset + len as u64;
            if faults
                .fail_read_ranges
                .iter()
                .any(|r| r.start < end && offset < r.end)
            {
                return Err(Self::injected("read"));
            }
        }

        let data = self.data.lock().await;
        let mut buf = vec![0u8; len];
        let size = data.len() as u64;

        if offset < size {
            let available = ((size - offset) as usize).min(len);
            let start = offset as usize;
            buf[..available].copy_from_slice(&data[start..start + available]);
        }

        Ok(Bytes::from(buf))
    }

    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize> {
        let faults = self.faults.lock().await;

        if faults.fail_writes {
            return Err(Self::injected("write"));
        }

        let len = if faults.short_writes { data.len() / 2 } else { data.len() };
        drop(faults);

        let mut stored = self.data.lock().await;
        let end = offset as usize + len;

        if stored.len() < end {
            stored.resize(end, 0);
        }

        stored[offset as usize..end].copy_from_slice(&data[..len]);
        Ok(len)
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        self.data.lock().await.resize(len as usize, 0);
        Ok(())
    }

    async fn fallocate(&self, len: u64) -> Result<()> {
        let mut stored = self.data.lock().await;

        if (stored.len() as u64) < len {
            stored.resize(len as usize, 0);
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
