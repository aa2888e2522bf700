//! Slotting grid domain model.
//!
//! # Responsibility
//! - Define the column/matrix/row/cell records shared by engine layers.
//! - Normalize caller-provided labels and colors in one place.
//!
//! # Invariants
//! - Every entity is identified by a v4 UUID that is never reused.
//! - Rooms and bins are external entities referenced by opaque string id.

pub mod column;
pub mod matrix;
pub mod normalize;
pub mod snapshot;
