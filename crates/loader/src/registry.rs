//! Identity-keyed ownership of the resources behind delivered results.
//!
//! Results are keyed by the address of their `Arc`, never by equality: two
//! generations may legitimately produce equal values, or hand back the very
//! same cached object. Each entry keeps its `Arc` alive so the address cannot
//! be reused while the entry exists, and tracks the set of generations that
//! currently claim it. The resource is handed back for release only when that
//! set empties and no other entry still owns the same resource.
//!
//! The registry never releases anything itself; operations return the handles
//! the caller must release.

use std::collections::BTreeSet;
use std::sync::Arc;

use cola_cursor::{SharedCursor, same_cursor};
use rustc_hash::FxHashMap;

use crate::{Generation, ReleaseError};

/// A releasable resource tied to a result.
pub trait Resource {
	/// Releases the resource; a second release reports [`ReleaseError::AlreadyReleased`].
	fn release(&self) -> Result<(), ReleaseError>;

	/// True when both handles refer to the same underlying resource.
	fn same_resource(&self, other: &Self) -> bool;
}

impl Resource for SharedCursor {
	fn release(&self) -> Result<(), ReleaseError> {
		if self.is_closed() {
			return Err(ReleaseError::AlreadyReleased);
		}
		self.close().map_err(ReleaseError::from)
	}

	fn same_resource(&self, other: &Self) -> bool {
		same_cursor(self, other)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct ResultKey(usize);

impl ResultKey {
	fn of<T>(result: &Arc<T>) -> Self {
		Self(Arc::as_ptr(result).cast::<()>().addr())
	}
}

#[derive(Debug)]
struct Entry<T, H> {
	// Held only to pin the address used as the key.
	_result: Arc<T>,
	handle: H,
	claims: BTreeSet<Generation>,
}

/// Result identity → resource handle, with per-entry generation claims.
#[derive(Debug)]
pub struct ResultRegistry<T, H> {
	entries: FxHashMap<ResultKey, Entry<T, H>>,
}

impl<T, H> Default for ResultRegistry<T, H> {
	fn default() -> Self {
		Self {
			entries: FxHashMap::default(),
		}
	}
}

impl<T, H: Resource> ResultRegistry<T, H> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records that `generation` delivered `result`, backed by `handle`.
	///
	/// If `result` is already registered, the generation joins its claim set.
	/// A `handle` that is a different resource from the registered one is
	/// returned for immediate release; the registered resource stays.
	#[must_use = "a returned handle must be released"]
	pub fn claim(&mut self, result: &Arc<T>, generation: Generation, handle: H) -> Option<H> {
		let key = ResultKey::of(result);
		if let Some(entry) = self.entries.get_mut(&key) {
			entry.claims.insert(generation);
			return (!entry.handle.same_resource(&handle)).then_some(handle);
		}

		self.entries.insert(
			key,
			Entry {
				_result: Arc::clone(result),
				handle,
				claims: BTreeSet::from([generation]),
			},
		);
		None
	}

	/// Drops `generation`'s claim on `result`.
	///
	/// Returns the handle once nothing claims the entry any more, unless
	/// another entry still owns the same resource.
	#[must_use = "a returned handle must be released"]
	pub fn unclaim(&mut self, result: &Arc<T>, generation: Generation) -> Option<H> {
		let key = ResultKey::of(result);
		let entry = self.entries.get_mut(&key)?;
		if !entry.claims.remove(&generation) || !entry.claims.is_empty() {
			return None;
		}

		let entry = self.entries.remove(&key)?;
		(!self.owns(&entry.handle)).then_some(entry.handle)
	}

	/// Disposes of a result that will never be delivered.
	///
	/// The handle comes back for release unless a registered entry already
	/// owns that very resource, which would make releasing it a double release.
	#[must_use = "a returned handle must be released"]
	pub fn discard(&mut self, result: Option<&Arc<T>>, handle: H) -> Option<H> {
		if let Some(result) = result
			&& let Some(entry) = self.entries.get(&ResultKey::of(result))
		{
			tracing::trace!(claims = entry.claims.len(), "registry.discard_shared_result");
		}
		(!self.owns(&handle)).then_some(handle)
	}

	/// True when some entry holds `handle`'s resource.
	pub fn owns(&self, handle: &H) -> bool {
		self.entries.values().any(|entry| entry.handle.same_resource(handle))
	}

	pub fn contains(&self, result: &Arc<T>) -> bool {
		self.entries.contains_key(&ResultKey::of(result))
	}

	/// Generations currently claiming `result`, in ascending order.
	pub fn claims(&self, result: &Arc<T>) -> Vec<Generation> {
		self.entries
			.get(&ResultKey::of(result))
			.map(|entry| entry.claims.iter().copied().collect())
			.unwrap_or_default()
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Empties the registry, returning each distinct resource once.
	#[must_use = "returned handles must be released"]
	pub fn drain(&mut self) -> Vec<H> {
		let mut handles: Vec<H> = Vec::with_capacity(self.entries.len());
		for (_, entry) in self.entries.drain() {
			if !handles.iter().any(|h| h.same_resource(&entry.handle)) {
				handles.push(entry.handle);
			}
		}
		handles
	}
}
