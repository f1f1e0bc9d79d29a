use std::sync::atomic::{AtomicBool, Ordering};

use crate::{Cursor, CursorError, Uri, Value};

/// In-memory cursor built row by row.
#[derive(Debug)]
pub struct MatrixCursor {
	columns: Vec<String>,
	rows: Vec<Vec<Value>>,
	notification_uri: Option<Uri>,
	closed: AtomicBool,
}

impl MatrixCursor {
	pub fn new<I, S>(columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			columns: columns.into_iter().map(Into::into).collect(),
			rows: Vec::new(),
			notification_uri: None,
			closed: AtomicBool::new(false),
		}
	}

	/// Appends one row; its width must match the column count.
	pub fn add_row<I, V>(&mut self, values: I) -> Result<&mut Self, CursorError>
	where
		I: IntoIterator<Item = V>,
		V: Into<Value>,
	{
		let row: Vec<Value> = values.into_iter().map(Into::into).collect();
		if row.len() != self.columns.len() {
			return Err(CursorError::RowWidth {
				expected: self.columns.len(),
				found: row.len(),
			});
		}
		self.rows.push(row);
		Ok(self)
	}

	pub fn set_notification_uri(&mut self, uri: impl Into<Uri>) -> &mut Self {
		self.notification_uri = Some(uri.into());
		self
	}
}

impl Cursor for MatrixCursor {
	fn columns(&self) -> &[String] {
		&self.columns
	}

	fn count(&self) -> usize {
		self.rows.len()
	}

	fn value(&self, position: usize, column: usize) -> Result<Value, CursorError> {
		if self.is_closed() {
			return Err(CursorError::Closed);
		}
		let row = self.rows.get(position).ok_or(CursorError::RowOutOfRange {
			position,
			count: self.rows.len(),
		})?;
		row.get(column).cloned().ok_or(CursorError::ColumnOutOfRange {
			column,
			columns: self.columns.len(),
		})
	}

	fn close(&self) -> Result<(), CursorError> {
		if self.closed.swap(true, Ordering::AcqRel) {
			return Err(CursorError::AlreadyClosed);
		}
		tracing::trace!(rows = self.rows.len(), "cursor.close");
		Ok(())
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	fn notification_uri(&self) -> Option<&Uri> {
		self.notification_uri.as_ref()
	}
}
