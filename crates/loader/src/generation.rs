use std::fmt;

/// Identifier of one reload attempt. Later reloads compare greater.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn get(self) -> u64 {
		self.0
	}

	fn next(self) -> Self {
		Self(self.0.wrapping_add(1))
	}
}

impl fmt::Display for Generation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "g{}", self.0)
	}
}

/// Issues generations and remembers which one is current.
///
/// Owned by the controlling context; no synchronization.
#[derive(Debug, Default)]
pub struct GenerationTracker {
	last: Generation,
	current: Option<Generation>,
}

impl GenerationTracker {
	pub fn new() -> Self {
		Self::default()
	}

	/// Issues a fresh generation and makes it current, superseding all older ones.
	pub fn next_generation(&mut self) -> Generation {
		self.last = self.last.next();
		self.current = Some(self.last);
		self.last
	}

	pub fn is_current(&self, generation: Generation) -> bool {
		self.current == Some(generation)
	}

	pub fn current(&self) -> Option<Generation> {
		self.current
	}

	/// Most recently issued generation, current or not.
	pub fn last_issued(&self) -> Option<Generation> {
		(self.last != Generation::default()).then_some(self.last)
	}

	/// Supersedes every issued generation without issuing a new one.
	pub fn retire(&mut self) -> Option<Generation> {
		self.current.take()
	}
}
