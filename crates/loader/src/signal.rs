use cola_worker::GenerationToken;

use crate::{Cancelled, Generation};

/// Cooperative cancellation flag handed to data sources and stages.
#[derive(Debug, Clone)]
pub struct CancelSignal {
	token: GenerationToken,
}

impl CancelSignal {
	/// Creates an uncancelled signal for `generation`.
	pub fn new(generation: Generation) -> Self {
		Self::from_token(GenerationToken::new(generation.get()))
	}

	pub(crate) fn from_token(token: GenerationToken) -> Self {
		Self { token }
	}

	/// Generation this signal belongs to.
	pub fn generation(&self) -> Generation {
		Generation::from_raw(self.token.generation())
	}

	pub fn is_cancelled(&self) -> bool {
		self.token.is_cancelled()
	}

	/// Returns `Err(Cancelled)` once cancellation was requested.
	pub fn check(&self) -> Result<(), Cancelled> {
		if self.is_cancelled() { Err(Cancelled) } else { Ok(()) }
	}

	pub fn cancel(&self) {
		self.token.cancel();
	}
}
