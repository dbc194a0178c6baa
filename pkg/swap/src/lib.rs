//! Swap a Service over to an external address, and restore it later.
//!
//! A swap replaces the Service with a selector-less copy plus a manual
//! Endpoints object, and embeds a JSON snapshot of the original in the
//! replacement. Restore finds replacements by their marker label and
//! rebuilds the originals from those snapshots.

pub mod error;
pub mod inventory;
pub mod restore;
pub mod snapshot;
pub mod swap;

#[cfg(test)]
mod fixtures;

pub use error::{Error, Result};
pub use inventory::{SnapshotState, SwappedService, list_swapped};
pub use restore::{RestoreEngine, RestoreReport};
pub use swap::{SwapEngine, SwapOutcome};
