//! Background execution primitives for composed loaders.
//!
//! * [`ExecutionContext`] runs jobs on the blocking pool and hands completions
//!   back to a single controlling owner.
//! * [`GenerationToken`] carries cooperative cancellation for one generation.
//! * [`TaskClass`] labels the work a context submits.

mod class;
mod context;
mod failure;
mod spawn;
mod token;

pub use class::TaskClass;
pub use context::{Completion, ExecutionContext, ExecutionId};
pub use failure::{ExecutionFailure, panic_payload_message};
pub use token::GenerationToken;
