//! Layout configuration
//!
//! Immutable parameters of a striped file: how many data targets it spans,
//! the block width, the per-target header reservation and the I/O policy
//! knobs of the engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default per-request I/O timeout.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a RAID-DP striped file.
///
/// All fields are fixed for the lifetime of the file. The engine derives the
/// block-grid geometry (N² data blocks, N² + 2N total blocks per group) from
/// `stripe_count` and `block_size`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Number of data targets (N). The layout uses N + 2 targets in total.
    pub stripe_count: usize,

    /// Bytes per block (W).
    pub block_size: usize,

    /// Bytes reserved at the start of every target for metadata owned by a
    /// collaborator, not this engine.
    #[serde(default)]
    pub header_size: u64,

    /// Timeout for a single target read/write. A target exceeding it is
    /// closed and excluded for the remainder of the file instance.
    #[serde(default = "default_io_timeout")]
    pub io_timeout: Duration,

    /// Write repaired blocks back to their targets during degraded reads.
    #[serde(default = "default_true")]
    pub store_recovery: bool,

    /// Whether this instance is the entry server for the file. Only the
    /// entry server fans truncate/preallocate out to all targets.
    #[serde(default = "default_true")]
    pub is_entry_server: bool,

    /// Logical stripe index -> physical target index permutation. Logical
    /// indices N and N + 1 are always the simple and double parity roles.
    /// Empty means identity.
    #[serde(default)]
    pub logical_to_physical: Vec<usize>,
}

fn default_io_timeout() -> Duration {
    DEFAULT_IO_TIMEOUT
}

fn default_true() -> bool {
    true
}

impl LayoutConfig {
    /// Create a configuration with default policy knobs.
    pub fn new(stripe_count: usize, block_size: usize) -> Self {
        Self {
            stripe_count,
            block_size,
            header_size: 0,
            io_timeout: DEFAULT_IO_TIMEOUT,
            store_recovery: true,
            is_entry_server: true,
            logical_to_physical: Vec::new(),
        }
    }

    /// Total number of targets the layout spans (N + 2).
    pub fn target_count(&self) -> usize {
        self.stripe_count + 2
    }

    /// Validate the configuration.
    ///
    /// # Returns
    /// `Error::Config` if the geometry parameters or the target permutation
    /// are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.stripe_count < 2 {
            return Err(Error::Config(format!(
                "stripe_count must be at least 2, got {}",
                self.stripe_count
            )));
        }

        if self.block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".to_string()));
        }

        if !self.logical_to_physical.is_empty() {
            let n = self.target_count();

            if self.logical_to_physical.len() != n {
                return Err(Error::Config(format!(
                    "logical_to_physical must have {} entries, got {}",
                    n,
                    self.logical_to_physical.len()
                )));
            }

            let mut seen = vec![false; n];

            for &p in &self.logical_to_physical {
                if p >= n || seen[p] {
                    return Err(Error::Config(format!(
                        "logical_to_physical is not a permutation of 0..{}",
                        n
                    )));
                }
                seen[p] = true;
            }
        }

        Ok(())
    }

    /// The logical -> physical map, materialized (identity if unset).
    pub fn stripe_map(&self) -> Vec<usize> {
        if self.logical_to_physical.is_empty() {
            (0..self.target_count()).collect()
        } else {
            self.logical_to_physical.clone()
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
