use std::fmt;
use std::sync::Arc;

use cola_worker::TaskClass;

use crate::ReleaseError;

/// Receives resource release failures. Must not panic.
pub type FaultHook = Arc<dyn Fn(&ReleaseError) + Send + Sync>;

/// The running generation plus the one superseding it.
const MAX_IN_FLIGHT: usize = 2;

/// Tuning knobs for one loader.
#[derive(Clone)]
pub struct LoaderConfig {
	name: Arc<str>,
	task_class: TaskClass,
	max_in_flight: usize,
	fault_hook: FaultHook,
}

impl Default for LoaderConfig {
	fn default() -> Self {
		Self {
			name: Arc::from("loader"),
			task_class: TaskClass::IoBlocking,
			max_in_flight: MAX_IN_FLIGHT,
			fault_hook: Arc::new(|err: &ReleaseError| {
				tracing::warn!(error = %err, "loader.release_fault");
			}),
		}
	}
}

impl fmt::Debug for LoaderConfig {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LoaderConfig")
			.field("name", &self.name)
			.field("task_class", &self.task_class)
			.field("max_in_flight", &self.max_in_flight)
			.finish_non_exhaustive()
	}
}

impl LoaderConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Label attached to every event the loader logs.
	pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
		self.name = name.into();
		self
	}

	pub fn with_task_class(mut self, class: TaskClass) -> Self {
		self.task_class = class;
		self
	}

	/// Executions allowed to run at once; further reloads park. Clamped to `1..=2`.
	pub fn with_max_in_flight(mut self, max: usize) -> Self {
		self.max_in_flight = max.clamp(1, MAX_IN_FLIGHT);
		self
	}

	pub fn with_fault_hook(mut self, hook: impl Fn(&ReleaseError) + Send + Sync + 'static) -> Self {
		self.fault_hook = Arc::new(hook);
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn task_class(&self) -> TaskClass {
		self.task_class
	}

	pub fn max_in_flight(&self) -> usize {
		self.max_in_flight
	}

	pub(crate) fn report_fault(&self, err: &ReleaseError) {
		(self.fault_hook)(err);
	}
}
