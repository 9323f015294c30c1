//! RAID-DP Layout Engine
//!
//! The stateful half of the crate: the group buffer the write path fills,
//! the dispatcher that batches block I/O across the stripe targets, the
//! recovery fixed point that rebuilds corrupted blocks from row and
//! diagonal parity, and the [`RaidDpFile`] façade tying them together.

pub mod dispatch;
pub mod file;
pub mod group;
pub mod recovery;

pub use dispatch::{BlockWrite, ChunkRead, IoDispatcher};
pub use file::RaidDpFile;
pub use group::GroupBuffer;
pub use recovery::RecoveryEngine;
