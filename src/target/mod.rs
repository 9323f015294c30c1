//! Stripe Target Port
//!
//! A stripe target is one storage endpoint holding one column's worth of
//! blocks for a file: `header_size` reserved bytes at offset 0 (owned by a
//! collaborator), followed by sequential W-byte blocks. The engine only
//! needs asynchronous byte-range I/O plus sizing operations; opening,
//! authentication and checksumming live behind this trait.
//!
//! Implementations serialize their own requests; the dispatcher issues
//! batches of per-block operations and awaits them together, so no
//! parallelism is assumed within a single target.

pub mod file;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use file::FileTarget;
pub use memory::MemoryTarget;

/// Port for a single stripe target.
#[async_trait]
pub trait StripeTarget: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Ranges beyond the written extent read as zeroes; anything else is an
    /// I/O error. `readahead` is a hint for sequential group reads.
    async fn read_at(&self, offset: u64, len: usize, readahead: bool) -> Result<Bytes>;

    /// Write `data` at `offset`, returning the number of bytes written.
    ///
    /// A return value smaller than `data.len()` is treated as a fatal short
    /// write by the caller.
    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize>;

    /// Truncate the target to `len` bytes.
    async fn truncate(&self, len: u64) -> Result<()>;

    /// Pre-allocate `len` bytes.
    async fn fallocate(&self, len: u64) -> Result<()>;

    /// Flush and release the target. Called once; the engine drops the
    /// handle afterwards.
    async fn close(&self) -> Result<()>;
}

/// Shared handles implement the port too, so a test or caller can keep a
/// reference to a target after handing it to the engine.
#[async_trait]
impl<T: StripeTarget + ?Sized> StripeTarget for Arc<T> {
    async fn read_at(&self, offset: u64, len: usize, readahead: bool) -> Result<Bytes> {
        (**self).read_at(offset, len, readahead).await
    }

    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize> {
        (**self).write_at(offset, data).await
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        (**self).truncate(len).await
    }

    async fn fallocate(&self, len: u64) -> Result<()> {
        (**self).fallocate(len).await
    }

    async fn close(&self) -> Result<()> {
        (**self).close().await
    }
}
