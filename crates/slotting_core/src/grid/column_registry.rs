//! Global ordered column registry.
//!
//! # Responsibility
//! - Own the ordered set of columns shared by every matrix in scope.
//! - Provide metadata lookup and edits; cascades live in `GridState`.
//!
//! # Invariants
//! - Column ids are unique.
//! - Iteration order equals creation order (no reordering).

use crate::error::{EntityRef, MatrixError, MatrixResult};
use crate::model::column::{BinId, Column, ColumnId};

/// Ordered column list for one engine scope.
#[derive(Debug, Clone, Default)]
pub struct ColumnRegistry {
    columns: Vec<Column>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one column to the end of the registry.
    ///
    /// A duplicate id means the caller skipped id generation; that is an
    /// internal error rather than bad input.
    pub fn push(&mut self, column: Column) -> MatrixResult<()> {
        if self.contains(column.id) {
            return Err(MatrixError::invariant(format!(
                "column id {} is already registered",
                column.id
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    /// Replaces metadata of one column in place.
    pub fn update(
        &mut self,
        id: ColumnId,
        label: String,
        bound_bin_id: Option<BinId>,
        bin_label: Option<String>,
        display_width: Option<u32>,
    ) -> MatrixResult<Column> {
        let column = self
            .columns
            .iter_mut()
            .find(|column| column.id == id)
            .ok_or(MatrixError::NotFound(EntityRef::Column(id)))?;
        column.label = label;
        column.bound_bin_id = bound_bin_id;
        column.bin_label = bin_label;
        column.display_width = display_width;
        Ok(column.clone())
    }

    /// Removes one column and returns it.
    pub fn remove(&mut self, id: ColumnId) -> MatrixResult<Column> {
        let position = self
            .position(id)
            .ok_or(MatrixError::NotFound(EntityRef::Column(id)))?;
        Ok(self.columns.remove(position))
    }

    pub fn get(&self, id: ColumnId) -> Option<&Column> {
        self.columns.iter().find(|column| column.id == id)
    }

    pub fn contains(&self, id: ColumnId) -> bool {
        self.position(id).is_some()
    }

    /// Columns in creation order.
    pub fn list(&self) -> &[Column] {
        &self.columns
    }

    /// Column ids in creation order.
    pub fn ids(&self) -> Vec<ColumnId> {
        self.columns.iter().map(|column| column.id).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn position(&self, id: ColumnId) -> Option<usize> {
        self.columns.iter().position(|column| column.id == id)
    }
}
