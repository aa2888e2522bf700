//! Grid engine state: column registry, matrix store and cell index.
//!
//! # Responsibility
//! - Keep every matrix consistent with the shared column registry.
//! - Expose state as a plain `Clone` value so the command layer can apply a
//!   command to a private copy and publish it only on success. Clones share
//!   every matrix and row the command leaves alone.
//!
//! # Invariants
//! - After every successful operation on `GridState`, each row holds exactly
//!   one cell per registered column and no cell references an unknown column.

pub mod cell_index;
pub mod column_registry;
pub mod grid_store;
pub mod state;

pub use cell_index::{CellIndex, CellKey, RowCells};
pub use column_registry::ColumnRegistry;
pub use grid_store::{CascadeGuard, CascadeKind, CascadeStep, GridStore, NewMatrix};
pub use state::GridState;
