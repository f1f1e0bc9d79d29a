//! Error types for cursor access.

use thiserror::Error;

/// Errors raised while reading from or closing a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
	/// The cursor was closed before the read.
	#[error("cursor is closed")]
	Closed,

	/// `close` was called on a cursor that had already been closed.
	#[error("cursor was already closed")]
	AlreadyClosed,

	/// Row position outside `0..count`.
	#[error("row {position} out of range (count {count})")]
	RowOutOfRange { position: usize, count: usize },

	/// Column index outside the projection.
	#[error("column {column} out of range ({columns} columns)")]
	ColumnOutOfRange { column: usize, columns: usize },

	/// Column name not present in the projection.
	#[error("no such column: {0}")]
	NoSuchColumn(String),

	/// A row was added with the wrong number of values.
	#[error("row has {found} values, expected {expected}")]
	RowWidth { expected: usize, found: usize },

	/// A single row was expected.
	#[error("expected exactly one row, found {count}")]
	NotSingleRow { count: usize },

	/// A value could not be read as the requested type.
	#[error("column {column} holds {found}, expected {expected}")]
	TypeMismatch {
		column: usize,
		expected: &'static str,
		found: &'static str,
	},
}
