use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{CursorError, Uri, Value};

/// Read-only tabular result of a query.
///
/// Cursors are shared between the worker that produced them and the owner
/// that eventually closes them, so every method takes `&self`.
pub trait Cursor: Send + Sync + fmt::Debug {
	/// Column names in projection order.
	fn columns(&self) -> &[String];

	/// Number of rows.
	fn count(&self) -> usize;

	/// Reads one cell.
	fn value(&self, position: usize, column: usize) -> Result<Value, CursorError>;

	/// Releases the cursor. Closing twice is an error.
	fn close(&self) -> Result<(), CursorError>;

	fn is_closed(&self) -> bool;

	/// Uri whose changes invalidate this cursor's contents.
	fn notification_uri(&self) -> Option<&Uri> {
		None
	}

	fn column_index(&self, name: &str) -> Result<usize, CursorError> {
		self.columns()
			.iter()
			.position(|c| c == name)
			.ok_or_else(|| CursorError::NoSuchColumn(name.to_string()))
	}
}

/// Reference-counted cursor handle, the unit of ownership between loader stages.
pub type SharedCursor = Arc<dyn Cursor>;

/// Returns true if both handles point at the same cursor object.
pub fn same_cursor(a: &SharedCursor, b: &SharedCursor) -> bool {
	std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// One row of a cursor, borrowed for the duration of a row transform.
#[derive(Clone, Copy)]
pub struct Row<'a> {
	cursor: &'a dyn Cursor,
	position: usize,
}

impl<'a> Row<'a> {
	pub fn new(cursor: &'a dyn Cursor, position: usize) -> Self {
		Self { cursor, position }
	}

	pub fn position(&self) -> usize {
		self.position
	}

	pub fn columns(&self) -> &'a [String] {
		self.cursor.columns()
	}

	pub fn get(&self, column: usize) -> Result<Value, CursorError> {
		self.cursor.value(self.position, column)
	}

	pub fn get_named(&self, name: &str) -> Result<Value, CursorError> {
		self.get(self.cursor.column_index(name)?)
	}

	pub fn get_string(&self, column: usize) -> Result<String, CursorError> {
		match self.get(column)? {
			Value::Text(s) => Ok(s),
			Value::Integer(i) => Ok(i.to_string()),
			Value::Real(r) => Ok(r.to_string()),
			other => Err(mismatch(column, "text", &other)),
		}
	}

	pub fn get_i64(&self, column: usize) -> Result<i64, CursorError> {
		match self.get(column)? {
			Value::Integer(i) => Ok(i),
			other => Err(mismatch(column, "integer", &other)),
		}
	}

	pub fn get_f64(&self, column: usize) -> Result<f64, CursorError> {
		match self.get(column)? {
			Value::Real(r) => Ok(r),
			Value::Integer(i) => Ok(i as f64),
			other => Err(mismatch(column, "real", &other)),
		}
	}

	pub fn is_null(&self, column: usize) -> Result<bool, CursorError> {
		Ok(self.get(column)?.is_null())
	}
}

impl fmt::Debug for Row<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Row").field("position", &self.position).finish()
	}
}

fn mismatch(column: usize, expected: &'static str, found: &Value) -> CursorError {
	CursorError::TypeMismatch {
		column,
		expected,
		found: found.type_name(),
	}
}

/// Iterates the rows of `cursor` in order.
pub fn rows(cursor: &dyn Cursor) -> impl Iterator<Item = Row<'_>> {
	(0..cursor.count()).map(move |position| Row::new(cursor, position))
}

/// The single row of `cursor`.
///
/// Fails with [`CursorError::NotSingleRow`] for an empty cursor or one with
/// more than one row.
pub fn only_row(cursor: &dyn Cursor) -> Result<Row<'_>, CursorError> {
	match optional_row(cursor)? {
		Some(row) => Ok(row),
		None => Err(CursorError::NotSingleRow { count: 0 }),
	}
}

/// Like [`only_row`], but an empty cursor yields `None`.
pub fn optional_row(cursor: &dyn Cursor) -> Result<Option<Row<'_>>, CursorError> {
	match cursor.count() {
		0 => Ok(None),
		1 => Ok(Some(Row::new(cursor, 0))),
		count => Err(CursorError::NotSingleRow { count }),
	}
}

/// Cursor with no columns and no rows.
#[derive(Debug, Default)]
pub struct EmptyCursor {
	closed: AtomicBool,
}

impl Cursor for EmptyCursor {
	fn columns(&self) -> &[String] {
		&[]
	}

	fn count(&self) -> usize {
		0
	}

	fn value(&self, position: usize, _column: usize) -> Result<Value, CursorError> {
		if self.is_closed() {
			return Err(CursorError::Closed);
		}
		Err(CursorError::RowOutOfRange { position, count: 0 })
	}

	fn close(&self) -> Result<(), CursorError> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Err(CursorError::AlreadyClosed);
		}
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}
}

/// Substitutes an [`EmptyCursor`] for a missing query result.
pub fn empty_if_none(cursor: Option<SharedCursor>) -> SharedCursor {
	cursor.unwrap_or_else(|| Arc::new(EmptyCursor::default()))
}
