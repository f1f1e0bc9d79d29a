//! Background execution with completions handed back to one controlling owner.
//!
//! Jobs run on the blocking pool. Their outcomes travel over a channel and are
//! only observed when the owner drains them, so every piece of state the owner
//! touches while handling a completion stays single-threaded.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::failure::ExecutionFailure;
use crate::TaskClass;
use crate::spawn::spawn_job;

/// Submission-ordered identifier of one background execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionId(u64);

impl ExecutionId {
	/// Raw submission sequence number.
	pub const fn get(self) -> u64 {
		self.0
	}
}

/// Outcome of one execution, as seen by the controlling owner.
#[derive(Debug)]
pub struct Completion<M> {
	pub id: ExecutionId,
	pub outcome: Result<M, ExecutionFailure>,
}

/// Receives values whose owner dropped the context before draining them.
pub type OrphanHandler<M> = Arc<dyn Fn(M) + Send + Sync>;

/// Runs jobs off the controlling context and queues their completions.
///
/// Submission order is FIFO; completion order is whatever order the jobs
/// finish in. Each submitted job yields exactly one [`Completion`], including
/// jobs that panic. Values finishing after the context is dropped go to the
/// orphan handler, if one is set, on the worker that produced them.
pub struct ExecutionContext<M> {
	class: TaskClass,
	next_id: u64,
	pending: usize,
	tx: mpsc::UnboundedSender<Completion<M>>,
	rx: mpsc::UnboundedReceiver<Completion<M>>,
	orphan: Option<OrphanHandler<M>>,
}

impl<M> fmt::Debug for ExecutionContext<M> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ExecutionContext")
			.field("class", &self.class)
			.field("next_id", &self.next_id)
			.field("pending", &self.pending)
			.field("orphan_handler", &self.orphan.is_some())
			.finish()
	}
}

impl<M> ExecutionContext<M>
where
	M: Send + 'static,
{
	/// Creates an empty context whose jobs are tagged with `class`.
	pub fn new(class: TaskClass) -> Self {
		let (tx, rx) = mpsc::unbounded_channel();
		Self {
			class,
			next_id: 0,
			pending: 0,
			tx,
			rx,
			orphan: None,
		}
	}

	/// Installs the handler for values completing after this context is dropped.
	pub fn set_orphan_handler(&mut self, handler: impl Fn(M) + Send + Sync + 'static) {
		self.orphan = Some(Arc::new(handler));
	}

	/// Task class attached to submitted jobs.
	pub fn class(&self) -> TaskClass {
		self.class
	}

	/// Schedules `job` on a background worker.
	pub fn submit<F>(&mut self, job: F) -> ExecutionId
	where
		F: FnOnce() -> M + Send + 'static,
	{
		let id = ExecutionId(self.next_id);
		self.next_id = self.next_id.wrapping_add(1);
		self.pending += 1;

		tracing::trace!(worker_class = self.class.as_str(), execution = id.0, pending = self.pending, "worker.context.submit");

		let class = self.class;
		let tx = self.tx.clone();
		let orphan = self.orphan.clone();
		spawn_job(class, job, move |handle| async move {
			let outcome = handle.await.map_err(ExecutionFailure::from);
			if let Err(failure) = &outcome {
				tracing::warn!(worker_class = class.as_str(), execution = id.0, error = %failure, "worker.context.job_failed");
			}
			// The receiver lives as long as the context; a send error means the owner is gone.
			if let Err(mpsc::error::SendError(completion)) = tx.send(Completion { id, outcome }) {
				tracing::debug!(worker_class = class.as_str(), execution = id.0, "worker.context.orphaned");
				if let (Some(handler), Ok(value)) = (orphan, completion.outcome) {
					handler(value);
				}
			}
		});
		id
	}

	/// Number of submitted executions whose completion has not been taken yet.
	pub fn pending(&self) -> usize {
		self.pending
	}

	/// Returns true when every submitted execution has been drained.
	pub fn is_quiescent(&self) -> bool {
		self.pending == 0
	}

	/// Takes one ready completion without waiting.
	pub fn try_next(&mut self) -> Option<Completion<M>> {
		let completion = self.rx.try_recv().ok()?;
		self.pending = self.pending.saturating_sub(1);
		Some(completion)
	}

	/// Stops accepting completions.
	///
	/// Completions already queued stay available through [`Self::try_next`];
	/// executions finishing later hand their values to the orphan handler.
	pub fn close(&mut self) {
		self.rx.close();
	}

	/// Waits for the next completion, or returns `None` when nothing is pending.
	pub async fn next(&mut self) -> Option<Completion<M>> {
		if self.pending == 0 {
			return None;
		}
		let completion = self.rx.recv().await?;
		self.pending = self.pending.saturating_sub(1);
		Some(completion)
	}
}
