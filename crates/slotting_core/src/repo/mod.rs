//! Repository contracts for the external snapshot store.
//!
//! # Responsibility
//! - Persist and reload complete engine snapshots.
//! - Keep SQL details out of the engine and command layers.
//!
//! # Invariants
//! - A save replaces the stored snapshot atomically.
//! - Loaded data is validated again by `GridState::from_snapshot`.

pub mod snapshot_repo;
