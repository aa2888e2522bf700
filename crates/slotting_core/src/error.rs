//! Engine error taxonomy.
//!
//! # Responsibility
//! - Define the typed failures every command and query can return.
//! - Classify failures into caller-facing kinds with stable codes.
//!
//! # Invariants
//! - `NotFound` and `InvalidArgument` are user errors; everything else is
//!   internal and must be logged.
//! - Error codes returned by `MatrixError::code()` never change meaning.

use crate::model::column::{BinId, ColumnId};
use crate::model::matrix::{MatrixId, RowId};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Result type used by engine operations.
pub type MatrixResult<T> = Result<T, MatrixError>;

/// Identifies which referenced entity could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Matrix(MatrixId),
    Row { matrix_id: MatrixId, row_id: RowId },
    Column(ColumnId),
    Cell {
        matrix_id: MatrixId,
        row_id: RowId,
        column_id: ColumnId,
    },
    Bin(BinId),
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matrix(id) => write!(f, "matrix {id}"),
            Self::Row { matrix_id, row_id } => write!(f, "row {row_id} in matrix {matrix_id}"),
            Self::Column(id) => write!(f, "column {id}"),
            Self::Cell {
                matrix_id,
                row_id,
                column_id,
            } => write!(f, "cell ({matrix_id}, {row_id}, {column_id})"),
            Self::Bin(id) => write!(f, "bin `{id}`"),
        }
    }
}

/// Coarse classification of a `MatrixError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvariantViolation,
    DirectoryUnavailable,
    Timeout,
}

impl ErrorKind {
    /// Whether the failure was caused by caller input (4xx-style).
    pub fn is_user_error(self) -> bool {
        matches!(self, Self::NotFound | Self::InvalidArgument)
    }
}

/// Errors returned by matrix engine commands and queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatrixError {
    /// Referenced matrix/row/column/cell/bin does not exist.
    NotFound(EntityRef),
    /// Caller input failed validation.
    InvalidArgument(String),
    /// Internal consistency check failed; indicates a cascade bug.
    InvariantViolation(String),
    /// An external directory lookup failed; the command was not applied.
    DirectoryUnavailable(String),
    /// Caller deadline expired before the command was published.
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },
}

impl MatrixError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::DirectoryUnavailable(_) => ErrorKind::DirectoryUnavailable,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Stable machine-readable code for logs and FFI envelopes.
    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::InvariantViolation => "invariant_violation",
            ErrorKind::DirectoryUnavailable => "directory_unavailable",
            ErrorKind::Timeout => "timeout",
        }
    }

    pub fn is_user_error(&self) -> bool {
        self.kind().is_user_error()
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

impl Display for MatrixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity) => write!(f, "{entity} not found"),
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::InvariantViolation(message) => {
                write!(f, "internal invariant violated: {message}")
            }
            Self::DirectoryUnavailable(message) => write!(f, "directory unavailable: {message}"),
            Self::Timeout {
                operation,
                timeout_ms,
            } => write!(f, "{operation} timed out after {timeout_ms}ms"),
        }
    }
}

impl Error for MatrixError {}

#[cfg(test)]
mod tests {
    use super::{EntityRef, ErrorKind, MatrixError};
    use uuid::Uuid;

    #[test]
    fn user_errors_are_classified_as_such() {
        let not_found = MatrixError::NotFound(EntityRef::Matrix(Uuid::new_v4()));
        assert!(not_found.is_user_error());
        assert_eq!(not_found.code(), "not_found");

        let invalid = MatrixError::invalid("label must not be blank");
        assert!(invalid.is_user_error());
        assert_eq!(invalid.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn internal_errors_are_not_user_errors() {
        let violation = MatrixError::invariant("row missing cell");
        assert!(!violation.is_user_error());
        assert_eq!(violation.code(), "invariant_violation");

        let timeout = MatrixError::Timeout {
            operation: "add_column",
            timeout_ms: 5,
        };
        assert!(!timeout.is_user_error());
        assert!(timeout.to_string().contains("add_column"));
    }
}
