use std::future::Future;
use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

use crate::TaskClass;

/// Runtime used when a context submits from outside any tokio runtime.
fn fallback_runtime() -> &'static Runtime {
	static FALLBACK: OnceLock<Runtime> = OnceLock::new();
	FALLBACK.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("cola-worker")
			.build()
			.expect("failed to build cola-worker fallback runtime")
	})
}

fn handle() -> Handle {
	Handle::try_current().unwrap_or_else(|_| fallback_runtime().handle().clone())
}

/// Runs a job on the blocking pool and the task forwarding its outcome.
pub(crate) fn spawn_job<J, R, F, Fut>(class: TaskClass, job: J, forward: F)
where
	J: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
	F: FnOnce(JoinHandle<R>) -> Fut,
	Fut: Future<Output = ()> + Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_job");
	let handle = handle();
	let job = handle.spawn_blocking(job);
	handle.spawn(forward(job));
}
