//! In-process change notifications keyed by [`Uri`].

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::Uri;

/// Buffered notifications per subscriber before it starts lagging.
const NOTIFY_BUFFER: usize = 64;

/// Broadcast hub for "the data behind this uri changed" signals.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
	tx: broadcast::Sender<Uri>,
}

impl Default for ChangeNotifier {
	fn default() -> Self {
		Self::new()
	}
}

impl ChangeNotifier {
	pub fn new() -> Self {
		let (tx, _) = broadcast::channel(NOTIFY_BUFFER);
		Self { tx }
	}

	/// Publishes a change; returns the number of live subscriptions.
	pub fn notify_change(&self, uri: &Uri) -> usize {
		tracing::trace!(uri = %uri, "notify.change");
		self.tx.send(uri.clone()).unwrap_or(0)
	}

	/// Opens a subscription that initially watches nothing.
	pub fn subscribe(&self) -> ChangeSubscription {
		ChangeSubscription {
			rx: self.tx.subscribe(),
			watched: Vec::new(),
		}
	}
}

/// Receiving side of a [`ChangeNotifier`], filtered to a set of watched uris.
///
/// A watched uri also matches changes to its descendants.
#[derive(Debug)]
pub struct ChangeSubscription {
	rx: broadcast::Receiver<Uri>,
	watched: Vec<Uri>,
}

impl ChangeSubscription {
	pub fn watch(&mut self, uri: Uri) {
		if !self.watched.contains(&uri) {
			self.watched.push(uri);
		}
	}

	pub fn unwatch_all(&mut self) {
		self.watched.clear();
	}

	pub fn watched(&self) -> &[Uri] {
		&self.watched
	}

	fn matches(&self, uri: &Uri) -> bool {
		self.watched.iter().any(|base| uri.is_descendant_of(base))
	}

	/// Drains buffered notifications; true if any touched a watched uri.
	///
	/// A lagged receiver counts as changed whenever something is watched.
	pub fn take_changed(&mut self) -> bool {
		let mut changed = false;
		loop {
			match self.rx.try_recv() {
				Ok(uri) => changed |= self.matches(&uri),
				Err(TryRecvError::Lagged(skipped)) => {
					tracing::debug!(skipped, "notify.lagged");
					changed |= !self.watched.is_empty();
				}
				Err(TryRecvError::Empty | TryRecvError::Closed) => return changed,
			}
		}
	}

	/// Waits for the next notification touching a watched uri.
	///
	/// Returns `None` once every notifier has been dropped.
	pub async fn changed(&mut self) -> Option<Uri> {
		loop {
			match self.rx.recv().await {
				Ok(uri) if self.matches(&uri) => return Some(uri),
				Ok(_) => {}
				Err(RecvError::Lagged(skipped)) => {
					tracing::debug!(skipped, "notify.lagged");
					if let Some(first) = self.watched.first() {
						return Some(first.clone());
					}
				}
				Err(RecvError::Closed) => return None,
			}
		}
	}
}
