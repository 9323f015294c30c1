//! File-Backed Stripe Target
//!
//! One local file per stripe. Requests are serialized through a
//! `tokio::sync::Mutex` around the file handle, which also provides the
//! per-target ordering the dispatcher relies on.

use std::io::SeekFrom;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::target::StripeTarget;

/// Stripe target stored in a local file.
pub struct FileTarget {
    file: Mutex<File>,
}

impl FileTarget {
    /// Open (or create) the stripe file at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())
            .await?;

        debug!(path = %path.as_ref().display(), "opened stripe file");
        Ok(Self { file: Mutex::new(file) })
    }
}

#[async_trait]
impl StripeTarget for FileTarget {
    async fn read_at(&self, offset: u64, len: usize, _readahead: bool) -> Result<Bytes> {
        let mut file = self.file.lock().await;
        let mut buf = vec![0u8; len];
        let size = file.metadata().await?.len();

        // Ranges past the written extent read as zeroes.
        if offset < size {
            let available = ((size - offset) as usize).min(len);
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut buf[..available]).await?;
        }

        Ok(Bytes::from(buf))
    }

    async fn write_at(&self, offset: u64, data: Bytes) -> Result<usize> {
        let mut file = self.file.lock().await;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&data).await?;
        Ok(data.len())
    }

    async fn truncate(&self, len: u64) -> Result<()> {
        let file = self.file.lock().await;
        file.set_len(len).await?;
        Ok(())
    }

    async fn fallocate(&self, len: u64) -> Result<()> {
        // Reservation is modeled as extension; the filesystem keeps the
        // range sparse until written.
        let file = self.file.lock().await;

        if file.metadata().await?.len() < len {
            file.set_len(len).await?;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let file = self.file.lock().await;
        file.sync_all().await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
