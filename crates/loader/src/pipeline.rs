//! Fetch followed by ordered transformation stages, run on a background worker.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use cola_cursor::{QueryData, RowFn, SharedCursor, Uri, rows};
use cola_worker::panic_payload_message;

use crate::error::StageError;
use crate::{CancelSignal, DataSource, FetchError, LoadError, TransformError};

/// Composed stage chain: maps the fetched cursor to a stage output.
pub(crate) type Stage<O> = Arc<dyn Fn(&SharedCursor, &CancelSignal) -> Result<O, StageError> + Send + Sync>;

/// Stage that hands the fetched cursor on unchanged.
pub(crate) fn cursor_stage() -> Stage<SharedCursor> {
	Arc::new(|cursor: &SharedCursor, _: &CancelSignal| Ok(Arc::clone(cursor)))
}

/// Appends `next` to `prev`. `next` never starts once the signal is cancelled.
pub(crate) fn then<A, B, F>(prev: Stage<A>, next: F) -> Stage<B>
where
	A: 'static,
	B: 'static,
	F: Fn(A, &SharedCursor, &CancelSignal) -> Result<B, StageError> + Send + Sync + 'static,
{
	Arc::new(move |cursor: &SharedCursor, signal: &CancelSignal| {
		let input = prev(cursor, signal)?;
		signal.check()?;
		next(input, cursor, signal)
	})
}

/// Applies `row_fn` to every row in order.
///
/// With a signal, cancellation is re-checked before each row.
pub(crate) fn collect_rows<R>(
	cursor: &SharedCursor,
	row_fn: &RowFn<R>,
	signal: Option<&CancelSignal>,
) -> Result<Vec<R>, StageError> {
	let mut out = Vec::with_capacity(cursor.count());
	for row in rows(cursor.as_ref()) {
		if let Some(signal) = signal {
			signal.check()?;
		}
		out.push(row_fn(&row)?);
	}
	Ok(out)
}

/// What one pipeline run produced.
///
/// Every variant carries the fetched cursor, if one was obtained, so the
/// owner can release it.
#[derive(Debug)]
pub enum PipelineOutcome<T> {
	Completed { result: Arc<T>, cursor: SharedCursor },
	Cancelled { cursor: Option<SharedCursor> },
	Failed { error: LoadError, cursor: Option<SharedCursor> },
}

impl<T> PipelineOutcome<T> {
	/// Cursor fetched by the run, whatever its outcome.
	pub fn cursor(&self) -> Option<&SharedCursor> {
		match self {
			Self::Completed { cursor, .. } => Some(cursor),
			Self::Cancelled { cursor } | Self::Failed { cursor, .. } => cursor.as_ref(),
		}
	}

	pub fn is_completed(&self) -> bool {
		matches!(self, Self::Completed { .. })
	}

	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled { .. })
	}
}

/// Query plus its composed transformation stages.
pub struct Pipeline<T> {
	source: Arc<dyn DataSource>,
	query: QueryData,
	notification_uris: Vec<Uri>,
	stage: Stage<Arc<T>>,
	stages: usize,
}

impl<T> fmt::Debug for Pipeline<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Pipeline")
			.field("query", &self.query)
			.field("notification_uris", &self.notification_uris)
			.field("stages", &self.stages)
			.finish_non_exhaustive()
	}
}

impl<T> Pipeline<T> {
	pub(crate) fn new(
		source: Arc<dyn DataSource>,
		query: QueryData,
		notification_uris: Vec<Uri>,
		stage: Stage<Arc<T>>,
		stages: usize,
	) -> Self {
		Self {
			source,
			query,
			notification_uris,
			stage,
			stages,
		}
	}

	pub fn query(&self) -> &QueryData {
		&self.query
	}

	/// Extra uris observed once a result has been delivered.
	pub fn notification_uris(&self) -> &[Uri] {
		&self.notification_uris
	}

	/// Number of transformation stages after the fetch.
	pub fn stages(&self) -> usize {
		self.stages
	}

	/// Runs fetch and stages for one generation.
	///
	/// Cancellation is checked before the fetch, after it, between stages and
	/// after the last stage; a cancelled run never reports a partial result.
	/// Panics in the source or a stage are reported as failures.
	pub fn run(&self, signal: &CancelSignal) -> PipelineOutcome<T> {
		if signal.is_cancelled() {
			return PipelineOutcome::Cancelled { cursor: None };
		}

		let fetched = panic::catch_unwind(AssertUnwindSafe(|| self.source.query(&self.query, signal)));
		let cursor = match fetched {
			Ok(Ok(cursor)) => cursor,
			Ok(Err(FetchError::Cancelled)) => return PipelineOutcome::Cancelled { cursor: None },
			Ok(Err(err)) => {
				return PipelineOutcome::Failed {
					error: err.into(),
					cursor: None,
				};
			}
			Err(payload) => {
				return PipelineOutcome::Failed {
					error: FetchError::Panicked(panic_payload_message(payload.as_ref())).into(),
					cursor: None,
				};
			}
		};

		if signal.is_cancelled() {
			return PipelineOutcome::Cancelled { cursor: Some(cursor) };
		}

		let transformed = panic::catch_unwind(AssertUnwindSafe(|| (self.stage)(&cursor, signal)));
		match transformed {
			Ok(Ok(_)) if signal.is_cancelled() => PipelineOutcome::Cancelled { cursor: Some(cursor) },
			Ok(Ok(result)) => PipelineOutcome::Completed { result, cursor },
			Ok(Err(StageError::Cancelled)) => PipelineOutcome::Cancelled { cursor: Some(cursor) },
			Ok(Err(StageError::Failed(err))) => PipelineOutcome::Failed {
				error: err.into(),
				cursor: Some(cursor),
			},
			Err(payload) => PipelineOutcome::Failed {
				error: TransformError::Panicked(panic_payload_message(payload.as_ref())).into(),
				cursor: Some(cursor),
			},
		}
	}
}
