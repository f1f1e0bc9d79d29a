//! Error taxonomy for loads and resource cleanup.

use cola_cursor::CursorError;
use cola_worker::ExecutionFailure;
use thiserror::Error;

/// Boxed error produced by user-supplied stages and data sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Marker returned when a load observes that its generation was superseded.
///
/// Never surfaced to consumers; superseded work is suppressed silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Error)]
#[error("load cancelled")]
pub struct Cancelled;

/// The data source failed to produce a cursor.
#[derive(Debug, Error)]
pub enum FetchError {
	/// The source noticed the cancellation signal and gave up.
	#[error("query cancelled")]
	Cancelled,

	#[error(transparent)]
	Cursor(#[from] CursorError),

	#[error("data source failed: {0}")]
	Source(#[source] BoxError),

	#[error("data source panicked: {0}")]
	Panicked(String),
}

impl FetchError {
	/// Wraps any source-specific error.
	pub fn from_source(err: impl Into<BoxError>) -> Self {
		Self::Source(err.into())
	}
}

impl From<Cancelled> for FetchError {
	fn from(_: Cancelled) -> Self {
		Self::Cancelled
	}
}

/// A transformation stage failed.
#[derive(Debug, Error)]
pub enum TransformError {
	#[error(transparent)]
	Cursor(#[from] CursorError),

	#[error("transform stage failed: {0}")]
	Stage(#[source] BoxError),

	#[error("transform stage panicked: {0}")]
	Panicked(String),
}

/// Failure outcome handed to consumers of the current generation.
#[derive(Debug, Error)]
pub enum LoadError {
	#[error(transparent)]
	Fetch(#[from] FetchError),

	#[error(transparent)]
	Transform(#[from] TransformError),

	#[error(transparent)]
	Execution(#[from] ExecutionFailure),
}

/// Releasing a resource handle failed; reported to the fault hook only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
	#[error("resource was already released")]
	AlreadyReleased,

	#[error(transparent)]
	Cursor(#[from] CursorError),
}

/// Stage result inside a pipeline: cancellation is not a failure.
#[derive(Debug)]
pub(crate) enum StageError {
	Cancelled,
	Failed(TransformError),
}

impl From<Cancelled> for StageError {
	fn from(_: Cancelled) -> Self {
		Self::Cancelled
	}
}

impl From<TransformError> for StageError {
	fn from(err: TransformError) -> Self {
		Self::Failed(err)
	}
}

impl From<CursorError> for StageError {
	fn from(err: CursorError) -> Self {
		Self::Failed(TransformError::Cursor(err))
	}
}
