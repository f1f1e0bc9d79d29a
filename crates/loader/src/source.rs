use cola_cursor::{QueryData, SharedCursor};

use crate::{CancelSignal, FetchError};

/// Produces cursors for queries. Called from background workers.
///
/// Sources may poll `signal` while they work and return
/// [`FetchError::Cancelled`] to abandon a superseded query.
pub trait DataSource: Send + Sync {
	fn query(&self, query: &QueryData, signal: &CancelSignal) -> Result<SharedCursor, FetchError>;
}

impl<F> DataSource for F
where
	F: Fn(&QueryData, &CancelSignal) -> Result<SharedCursor, FetchError> + Send + Sync,
{
	fn query(&self, query: &QueryData, signal: &CancelSignal) -> Result<SharedCursor, FetchError> {
		self(query, signal)
	}
}
