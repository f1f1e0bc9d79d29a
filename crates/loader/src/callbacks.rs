use std::sync::Arc;

use crate::LoadError;

/// Consumer side of a loader. Always invoked on the controlling context.
pub trait LoaderCallbacks<T>: Send {
	/// A result of the current generation is available.
	fn on_load_finished(&mut self, result: Arc<T>);

	/// The current generation failed. Superseded failures never get here.
	fn on_load_failed(&mut self, error: &LoadError) {
		tracing::warn!(error = %error, "loader.load_failed");
	}

	/// The loader was destroyed; the last delivered result is being released.
	fn on_loader_reset(&mut self) {}
}

impl<T, F> LoaderCallbacks<T> for F
where
	F: FnMut(Arc<T>) + Send,
{
	fn on_load_finished(&mut self, result: Arc<T>) {
		self(result);
	}
}
