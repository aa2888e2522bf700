//! Column domain model.
//!
//! # Invariants
//! - `id` is immutable once created; a re-added column gets a fresh id.
//! - Columns are global to an engine scope and not owned by any matrix.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable column identifier.
pub type ColumnId = Uuid;

/// External bin identifier (owned by the bin directory).
pub type BinId = String;

/// One bin-slot position shared by every matrix in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub id: ColumnId,
    pub label: String,
    /// Bin this column is bound to, if any.
    pub bound_bin_id: Option<BinId>,
    /// Denormalized bin label resolved at write time.
    pub bin_label: Option<String>,
    /// Preferred display width in pixels.
    pub display_width: Option<u32>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Caller input for column create/update commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnDraft {
    pub label: String,
    pub bound_bin_id: Option<BinId>,
    pub display_width: Option<u32>,
}

impl ColumnDraft {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn bound_to(mut self, bin_id: impl Into<BinId>) -> Self {
        self.bound_bin_id = Some(bin_id.into());
        self
    }

    pub fn width(mut self, display_width: u32) -> Self {
        self.display_width = Some(display_width);
        self
    }
}
