//! RAID-DP Stripe Layout Engine
//!
//! Double-parity striping for a logical byte stream over N + 2 storage
//! targets: N carry data, one carries per-row (simple) parity and one
//! carries diagonal (double) parity. Any two concurrent target faults are
//! survivable; parity is plain XOR, computed per group of N² data blocks.
//!
//! # Architecture
//!
//! ```text
//! RaidDpFile (façade)
//!   ├── Geometry        pure index maps: offsets, grid, redundancy sets
//!   ├── GroupBuffer     accumulates the group being written
//!   ├── Parity Engine   XOR folds, row + diagonal parity of a group
//!   ├── IoDispatcher    batched block I/O, timeout-driven target exclusion
//!   │     └── StripeTarget (port)  file-backed or in-memory adapters
//!   └── RecoveryEngine  fixed-point repair over row/diagonal sets
//! ```
//!
//! Reads fetch only the touched blocks and fall back to full-group
//! recovery on any failure; writes stream data blocks to their targets and
//! flush parity at every group boundary (and once more at close for the
//! zero-padded trailing group).
//!
//! # Modules
//!
//! - [`config`] - Layout parameters and I/O policy knobs
//! - [`error`] - Error types
//! - [`geometry`] - Block-grid index arithmetic and redundancy sets
//! - [`parity`] - XOR primitives and group parity computation
//! - [`target`] - Stripe target port plus file and in-memory adapters
//! - [`layout`] - Group buffer, dispatcher, recovery engine and façade

pub mod config;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod parity;
pub mod target;

// Re-export commonly used types
pub use config::LayoutConfig;
pub use error::{Error, Result};
pub use geometry::Geometry;
pub use layout::{IoDispatcher, RaidDpFile, RecoveryEngine};
pub use target::{FileTarget, MemoryTarget, StripeTarget};
