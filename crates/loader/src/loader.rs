//! The composed loader: generation-tagged reloads with identity-safe result release.
//!
//! Every reload issues a new [`Generation`] and runs the pipeline on a
//! background worker. Completions come back to the owner of the loader, which
//! is the only place the tracker, the registry and the consumer callbacks are
//! touched. A completion is delivered only if its generation is still current
//! when the owner handles it; anything else is suppressed and its cursor
//! released, unless the very same cursor backs the delivered result.

use std::fmt;
use std::sync::Arc;

use cola_cursor::{ChangeNotifier, SharedCursor, Uri};
use cola_worker::{Completion, ExecutionContext, ExecutionId};

use crate::registry::{Resource, ResultRegistry};
use crate::{CancelSignal, Generation, GenerationTracker, LoadError, LoaderCallbacks, LoaderConfig, LoaderObserver, Pipeline, PipelineOutcome};


/// Externally visible loader state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
	/// Nothing current is running or parked.
	Idle,
	/// The current generation is running or waiting for a free slot.
	Loading(Generation),
	/// Destroyed; no further loads.
	Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Stopped,
	Started,
	Abandoned,
	Reset,
}

/// Counters describing what a loader did so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStats {
	/// Executions handed to the worker pool.
	pub submitted: u64,
	/// Results accepted for the current generation.
	pub delivered: u64,
	/// Failures of the current generation.
	pub failed: u64,
	/// Completed results dropped because their generation was superseded.
	pub suppressed: u64,
	/// Executions that stopped early on cancellation.
	pub cancelled: u64,
	/// Cursors closed by the loader.
	pub released: u64,
	/// Release attempts that failed and went to the fault hook.
	pub release_faults: u64,
}

#[derive(Debug)]
struct InFlight {
	id: ExecutionId,
	generation: Generation,
	signal: CancelSignal,
}

struct Delivered<T> {
	generation: Generation,
	result: Arc<T>,
	notification_uri: Option<Uri>,
}

/// Reloadable, transformable query result with at most one current generation.
///
/// All methods run on the controlling context. Completions are picked up by
/// [`ComposedLoader::pump`], [`ComposedLoader::process_next`] or
/// [`ComposedLoader::settle`].
pub struct ComposedLoader<T: Send + Sync + 'static> {
	pipeline: Arc<Pipeline<T>>,
	config: LoaderConfig,
	tracker: GenerationTracker,
	registry: ResultRegistry<T, SharedCursor>,
	executions: ExecutionContext<PipelineOutcome<T>>,
	in_flight: Vec<InFlight>,
	parked: Option<Generation>,
	delivered: Option<Delivered<T>>,
	observer: LoaderObserver,
	phase: Phase,
	content_changed: bool,
	pending_delivery: bool,
	stats: LoaderStats,
	callbacks: Box<dyn LoaderCallbacks<T>>,
}

impl<T: Send + Sync + 'static> fmt::Debug for ComposedLoader<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ComposedLoader")
			.field("name", &self.config.name())
			.field("pipeline", &self.pipeline)
			.field("phase", &self.phase)
			.field("current", &self.tracker.current())
			.field("in_flight", &self.in_flight)
			.field("parked", &self.parked)
			.field("delivered", &self.delivered.as_ref().map(|d| d.generation))
			.field("stats", &self.stats)
			.finish_non_exhaustive()
	}
}

impl<T: Send + Sync + 'static> ComposedLoader<T> {
	pub fn new(
		pipeline: Pipeline<T>,
		notifier: ChangeNotifier,
		config: LoaderConfig,
		callbacks: Box<dyn LoaderCallbacks<T>>,
	) -> Self {
		let mut executions = ExecutionContext::new(config.task_class());
		let name: Arc<str> = Arc::from(config.name());
		executions.set_orphan_handler(move |outcome: PipelineOutcome<T>| {
			if let Some(cursor) = outcome.cursor()
				&& let Err(err) = cursor.release()
			{
				tracing::debug!(loader = %name, error = %err, "loader.orphan_release");
			}
		});
		let observer = LoaderObserver::new(notifier, pipeline.notification_uris().to_vec());

		Self {
			pipeline: Arc::new(pipeline),
			config,
			tracker: GenerationTracker::new(),
			registry: ResultRegistry::new(),
			executions,
			in_flight: Vec::new(),
			parked: None,
			delivered: None,
			observer,
			phase: Phase::Stopped,
			content_changed: false,
			pending_delivery: false,
			stats: LoaderStats::default(),
			callbacks,
		}
	}

	/// Starts observing and delivering.
	///
	/// A result that completed while not started is handed over now. A load is
	/// triggered when there is no result yet or content changed while stopped.
	pub fn start_loading(&mut self) {
		if self.phase == Phase::Reset {
			tracing::warn!(loader = self.config.name(), "loader.start_after_reset");
			return;
		}
		tracing::debug!(loader = self.config.name(), "loader.start");
		self.phase = Phase::Started;
		self.observer.set_enabled(true);

		if self.pending_delivery
			&& let Some(delivered) = &self.delivered
		{
			self.pending_delivery = false;
			let result = Arc::clone(&delivered.result);
			self.observer.on_new_data(delivered.notification_uri.as_ref());
			self.callbacks.on_load_finished(result);
		}

		if (self.content_changed || self.delivered.is_none()) && !self.is_loading_current() {
			self.force_reload();
		}
	}

	/// Stops delivering and cancels running work.
	///
	/// Cancelling the current load counts as a content change, so the next
	/// start reloads.
	pub fn stop_loading(&mut self) {
		if self.phase == Phase::Reset {
			return;
		}
		tracing::debug!(loader = self.config.name(), "loader.stop");
		self.phase = Phase::Stopped;
		if self.is_loading_current() {
			self.content_changed = true;
		}
		self.tracker.retire();
		self.cancel_in_flight();
		self.parked = None;
	}

	/// Stops reacting to changes ahead of destruction. Running work continues.
	pub fn abandon(&mut self) {
		if self.phase == Phase::Reset {
			return;
		}
		tracing::debug!(loader = self.config.name(), "loader.abandon");
		self.phase = Phase::Abandoned;
		self.observer.set_enabled(false);
		self.observer.unregister();
	}

	/// Supersedes every generation and releases the delivered result.
	///
	/// Completions arriving later are suppressed. Idempotent.
	pub fn destroy(&mut self) {
		if self.phase == Phase::Reset {
			return;
		}
		tracing::debug!(loader = self.config.name(), in_flight = self.in_flight.len(), "loader.reset");
		self.phase = Phase::Reset;
		self.observer.set_enabled(false);
		self.observer.unregister();
		self.tracker.retire();
		self.cancel_in_flight();
		self.parked = None;
		self.content_changed = false;
		self.pending_delivery = false;

		self.callbacks.on_loader_reset();
		if let Some(previous) = self.delivered.take()
			&& let Some(cursor) = self.registry.unclaim(&previous.result, previous.generation)
		{
			self.release(cursor);
		}
		for cursor in self.registry.drain() {
			self.release(cursor);
		}
	}

	/// Triggers a reload, superseding every earlier generation.
	///
	/// Returns the new generation, or `None` once destroyed. When the
	/// in-flight limit is reached the generation is parked and starts when a
	/// slot frees up, unless a newer reload replaces it first.
	pub fn force_reload(&mut self) -> Option<Generation> {
		if self.phase == Phase::Reset {
			tracing::debug!(loader = self.config.name(), "loader.reload_after_reset");
			return None;
		}
		self.cancel_in_flight();
		let generation = self.tracker.next_generation();
		self.content_changed = false;
		if let Some(stale) = self.parked.take() {
			tracing::trace!(loader = self.config.name(), generation = %stale, "loader.unpark_superseded");
		}

		if self.in_flight.len() < self.config.max_in_flight() {
			self.launch(generation);
		} else {
			tracing::trace!(loader = self.config.name(), %generation, in_flight = self.in_flight.len(), "loader.park");
			self.parked = Some(generation);
		}
		Some(generation)
	}

	/// Reacts to a change of the observed data.
	pub fn on_content_changed(&mut self) {
		match self.phase {
			Phase::Started => {
				self.force_reload();
			}
			Phase::Stopped | Phase::Abandoned => self.content_changed = true,
			Phase::Reset => {}
		}
	}

	/// Handles every ready completion and change notification without waiting.
	///
	/// Returns the number of events handled.
	pub fn pump(&mut self) -> usize {
		let mut handled = 0;
		if self.observer.take_changed() {
			self.on_content_changed();
			handled += 1;
		}
		while let Some(completion) = self.executions.try_next() {
			self.on_completion(completion);
			handled += 1;
		}
		handled
	}

	/// Waits for one completion or watched change and handles it.
	///
	/// Returns `false` when there is nothing to wait for.
	pub async fn process_next(&mut self) -> bool {
		let listening = self.observer.is_listening();
		let pending = !self.executions.is_quiescent();
		if !listening && !pending {
			return false;
		}

		tokio::select! {
			Some(completion) = self.executions.next(), if pending => {
				self.on_completion(completion);
				true
			}
			Some(uri) = self.observer.changed(), if listening => {
				tracing::trace!(loader = self.config.name(), uri = %uri, "loader.content_changed");
				self.on_content_changed();
				true
			}
			else => false,
		}
	}

	/// Handles completions until no execution is outstanding, including
	/// executions started along the way.
	pub async fn settle(&mut self) {
		loop {
			if self.observer.take_changed() {
				self.on_content_changed();
			}
			let Some(completion) = self.executions.next().await else {
				break;
			};
			self.on_completion(completion);
		}
	}

	pub fn state(&self) -> LoaderState {
		if self.phase == Phase::Reset {
			return LoaderState::Reset;
		}
		match self.tracker.current() {
			Some(generation) if self.is_loading_current() => LoaderState::Loading(generation),
			_ => LoaderState::Idle,
		}
	}

	/// Most recently delivered result.
	pub fn result(&self) -> Option<Arc<T>> {
		self.delivered.as_ref().map(|d| Arc::clone(&d.result))
	}

	pub fn current_generation(&self) -> Option<Generation> {
		self.tracker.current()
	}

	pub fn stats(&self) -> LoaderStats {
		self.stats
	}

	/// Executions submitted and not yet handled.
	pub fn in_flight(&self) -> usize {
		self.in_flight.len()
	}

	/// True when nothing runs and nothing is parked.
	pub fn is_quiescent(&self) -> bool {
		self.executions.is_quiescent() && self.parked.is_none()
	}

	pub fn is_started(&self) -> bool {
		self.phase == Phase::Started
	}

	pub fn is_abandoned(&self) -> bool {
		self.phase == Phase::Abandoned
	}

	pub fn is_reset(&self) -> bool {
		self.phase == Phase::Reset
	}

	/// Whether a watched change would currently trigger handling.
	pub fn is_listening(&self) -> bool {
		self.observer.is_listening()
	}

	pub fn pipeline(&self) -> &Pipeline<T> {
		&self.pipeline
	}

	fn is_loading_current(&self) -> bool {
		self.tracker
			.current()
			.is_some_and(|g| self.parked == Some(g) || self.in_flight.iter().any(|e| e.generation == g))
	}

	fn cancel_in_flight(&self) {
		for execution in &self.in_flight {
			execution.signal.cancel();
		}
	}

	fn launch(&mut self, generation: Generation) {
		let signal = CancelSignal::new(generation);
		let job_signal = signal.clone();
		let pipeline = Arc::clone(&self.pipeline);
		let id = self.executions.submit(move || pipeline.run(&job_signal));
		self.in_flight.push(InFlight { id, generation, signal });
		self.stats.submitted += 1;
		tracing::debug!(
			loader = self.config.name(),
			%generation,
			execution = id.get(),
			in_flight = self.in_flight.len(),
			"loader.submit"
		);
	}

	fn launch_parked(&mut self) {
		if self.in_flight.len() >= self.config.max_in_flight() {
			return;
		}
		let Some(generation) = self.parked.take() else {
			return;
		};
		if self.tracker.is_current(generation) {
			self.launch(generation);
		}
	}

	fn on_completion(&mut self, completion: Completion<PipelineOutcome<T>>) {
		let Some(index) = self.in_flight.iter().position(|e| e.id == completion.id) else {
			tracing::warn!(loader = self.config.name(), execution = completion.id.get(), "loader.unknown_execution");
			return;
		};
		let generation = self.in_flight.swap_remove(index).generation;
		let current = self.tracker.is_current(generation);

		match completion.outcome {
			Ok(PipelineOutcome::Completed { result, cursor }) if current => self.deliver(generation, result, cursor),
			Ok(PipelineOutcome::Completed { result, cursor }) => {
				self.stats.suppressed += 1;
				tracing::debug!(loader = self.config.name(), %generation, "loader.suppress");
				self.discard(Some(&result), cursor);
			}
			Ok(PipelineOutcome::Cancelled { cursor }) => {
				self.stats.cancelled += 1;
				tracing::trace!(loader = self.config.name(), %generation, "loader.cancelled");
				if let Some(cursor) = cursor {
					self.discard(None, cursor);
				}
			}
			Ok(PipelineOutcome::Failed { error, cursor }) => {
				if let Some(cursor) = cursor {
					self.discard(None, cursor);
				}
				self.fail(generation, current, &error);
			}
			Err(failure) => self.fail(generation, current, &LoadError::Execution(failure)),
		}

		self.launch_parked();
	}

	fn deliver(&mut self, generation: Generation, result: Arc<T>, cursor: SharedCursor) {
		let notification_uri = cursor.notification_uri().cloned();
		if let Some(duplicate) = self.registry.claim(&result, generation, cursor) {
			tracing::debug!(loader = self.config.name(), %generation, "loader.duplicate_resource");
			self.release(duplicate);
		}

		let previous = self.delivered.replace(Delivered {
			generation,
			result: Arc::clone(&result),
			notification_uri: notification_uri.clone(),
		});
		self.stats.delivered += 1;
		tracing::debug!(loader = self.config.name(), %generation, "loader.deliver");

		if self.phase == Phase::Started {
			let new_identity = previous.as_ref().is_none_or(|p| !Arc::ptr_eq(&p.result, &result));
			if new_identity {
				self.observer.on_new_data(notification_uri.as_ref());
			}
			self.pending_delivery = false;
			self.callbacks.on_load_finished(result);
		} else {
			self.pending_delivery = true;
		}

		if let Some(previous) = previous
			&& let Some(cursor) = self.registry.unclaim(&previous.result, previous.generation)
		{
			self.release(cursor);
		}
	}

	fn fail(&mut self, generation: Generation, current: bool, error: &LoadError) {
		if !current {
			tracing::debug!(loader = self.config.name(), %generation, error = %error, "loader.failure_suppressed");
			return;
		}
		self.stats.failed += 1;
		self.callbacks.on_load_failed(error);
	}

	fn discard(&mut self, result: Option<&Arc<T>>, cursor: SharedCursor) {
		if let Some(cursor) = self.registry.discard(result, cursor) {
			self.release(cursor);
		}
	}

	fn release(&mut self, cursor: SharedCursor) {
		match cursor.release() {
			Ok(()) => {
				self.stats.released += 1;
				tracing::trace!(loader = self.config.name(), "loader.release");
			}
			Err(err) => {
				self.stats.release_faults += 1;
				self.config.report_fault(&err);
			}
		}
	}
}

impl<T: Send + Sync + 'static> Drop for ComposedLoader<T> {
	fn drop(&mut self) {
		self.destroy();
		self.executions.close();
		while let Some(completion) = self.executions.try_next() {
			self.on_completion(completion);
		}
	}
}
