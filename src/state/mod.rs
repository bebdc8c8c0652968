//! State module for tracking import progress
//!
//! # Components
//!
//! - `ImportPhase`: where a catalog run is in its state machine
//! - `FreezeState`: whether an Expansion or Set may still be updated from upstream data
//! - `ImportCheckpoint`: the persisted, resumable position of a catalog import

mod checkpoint;
mod freeze;
mod import_phase;

// Re-export main types
pub use checkpoint::ImportCheckpoint;
pub use freeze::FreezeState;
pub use import_phase::ImportPhase;
