use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::{CursorError, Row, SharedCursor};

/// Per-row transform shared by eager and lazy row collections.
pub type RowFn<T> = Arc<dyn Fn(&Row<'_>) -> Result<T, CursorError> + Send + Sync>;

/// Number of transformed rows a [`LazyRowList`] keeps by default.
pub const DEFAULT_LAZY_CACHE: usize = 256;

/// Random-access list that transforms cursor rows on first access.
///
/// The list keeps the cursor open; transformed rows are cached in a bounded
/// LRU so revisiting a row does not re-run the transform.
pub struct LazyRowList<T> {
	cursor: SharedCursor,
	row_fn: RowFn<T>,
	cache: Mutex<LruCache<usize, Arc<T>>>,
}

impl<T> LazyRowList<T> {
	pub fn new(cursor: SharedCursor, row_fn: RowFn<T>) -> Self {
		Self::with_capacity(cursor, row_fn, DEFAULT_LAZY_CACHE)
	}

	/// A zero capacity is treated as one.
	pub fn with_capacity(cursor: SharedCursor, row_fn: RowFn<T>, capacity: usize) -> Self {
		let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
		Self {
			cursor,
			row_fn,
			cache: Mutex::new(LruCache::new(capacity)),
		}
	}

	pub fn len(&self) -> usize {
		self.cursor.count()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Returns the transformed row at `index`, computing it if not cached.
	pub fn get(&self, index: usize) -> Result<Arc<T>, CursorError> {
		if let Some(hit) = self.cache.lock().get(&index) {
			return Ok(Arc::clone(hit));
		}

		let count = self.cursor.count();
		if index >= count {
			return Err(CursorError::RowOutOfRange { position: index, count });
		}
		// The transform runs unlocked; two racing readers may both compute the row.
		let value = Arc::new((self.row_fn)(&Row::new(self.cursor.as_ref(), index))?);
		self.cache.lock().put(index, Arc::clone(&value));
		Ok(value)
	}

	pub fn iter(&self) -> impl Iterator<Item = Result<Arc<T>, CursorError>> + '_ {
		(0..self.len()).map(|i| self.get(i))
	}

	/// Cursor backing this list.
	pub fn cursor(&self) -> &SharedCursor {
		&self.cursor
	}

	/// Closes the backing cursor.
	pub fn close(&self) -> Result<(), CursorError> {
		self.cursor.close()
	}
}

impl<T> fmt::Debug for LazyRowList<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LazyRowList")
			.field("len", &self.len())
			.field("cached", &self.cache.lock().len())
			.finish()
	}
}
