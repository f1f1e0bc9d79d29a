//! Generation-tracked, cancellable, transformable cursor loaders.
//!
//! A [`ComposedLoader`] runs a query followed by ordered transformation stages
//! on a background worker whenever it is asked to reload. Reloads may overlap;
//! only the newest completed generation is delivered, superseded work stops at
//! the next stage boundary, and each cursor behind a result is closed exactly
//! once, even when several generations hand back the same result object.
//!
//! Loaders are assembled with [`CursorLoaderBuilder`]:
//!
//! ```no_run
//! # use cola_cursor::{MatrixCursor, QueryData, SharedCursor};
//! # use cola_loader::{CancelSignal, CursorLoaderBuilder, FetchError, LoaderContext};
//! # use std::sync::Arc;
//! let ctx = LoaderContext::new(|_: &QueryData, _: &CancelSignal| -> Result<SharedCursor, FetchError> {
//! 	Ok(Arc::new(MatrixCursor::new(["name"])))
//! });
//! let mut loader = CursorLoaderBuilder::for_uri("content://people")
//! 	.transform_row(|row| row.get_string(0))
//! 	.build(&ctx, |names: Arc<Vec<String>>| println!("{} people", names.len()));
//! loader.start_loading();
//! ```

mod builder;
mod callbacks;
mod config;
mod context;
mod error;
mod generation;
mod loader;
mod observer;
mod pipeline;
mod registry;
mod signal;
mod source;

pub use builder::{CursorLoaderBuilder, RowLoaderBuilder, TransformedLoaderBuilder};
pub use callbacks::LoaderCallbacks;
pub use config::{FaultHook, LoaderConfig};
pub use context::LoaderContext;
pub use error::{BoxError, Cancelled, FetchError, LoadError, ReleaseError, TransformError};
pub use generation::{Generation, GenerationTracker};
pub use loader::{ComposedLoader, LoaderState, LoaderStats};
pub use observer::LoaderObserver;
pub use pipeline::{Pipeline, PipelineOutcome};
pub use registry::{Resource, ResultRegistry};
pub use signal::CancelSignal;
pub use source::DataSource;
