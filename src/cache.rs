//! Shared discovery feed cache: snapshots, lifecycle state, and refresh coordination.

pub mod entry;
pub mod manager;
pub mod snapshot;
pub mod state;
pub mod status;
