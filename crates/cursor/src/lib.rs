//! Cursor abstraction shared by data sources, transformation stages and loaders.

mod cursor;
mod error;
mod lazy;
mod matrix;
mod notify;
mod uri;
mod value;

pub use cursor::{Cursor, EmptyCursor, Row, SharedCursor, empty_if_none, only_row, optional_row, rows, same_cursor};
pub use error::CursorError;
pub use lazy::{DEFAULT_LAZY_CACHE, LazyRowList, RowFn};
pub use matrix::MatrixCursor;
pub use notify::{ChangeNotifier, ChangeSubscription};
pub use uri::{QueryData, Uri};
pub use value::Value;
