use cola_cursor::{ChangeNotifier, ChangeSubscription, Uri};

/// Change observer of one loader that can be switched off without
/// unsubscribing.
///
/// The delivered cursor's notification uri is watched whenever a new result
/// is delivered; the configured extra uris are registered once, on the first
/// such delivery, and again after [`LoaderObserver::unregister`].
#[derive(Debug)]
pub struct LoaderObserver {
	notifier: ChangeNotifier,
	subscription: Option<ChangeSubscription>,
	enabled: bool,
	extra_uris: Vec<Uri>,
	extra_registered: bool,
}

impl LoaderObserver {
	pub fn new(notifier: ChangeNotifier, extra_uris: Vec<Uri>) -> Self {
		Self {
			notifier,
			subscription: None,
			enabled: true,
			extra_uris,
			extra_registered: false,
		}
	}

	/// Re-enabling discards notifications that arrived while disabled.
	pub fn set_enabled(&mut self, enabled: bool) {
		if enabled
			&& !self.enabled
			&& let Some(sub) = self.subscription.as_mut()
		{
			sub.take_changed();
		}
		self.enabled = enabled;
	}

	pub fn is_enabled(&self) -> bool {
		self.enabled
	}

	/// True when enabled and watching at least one uri.
	pub fn is_listening(&self) -> bool {
		self.enabled && self.subscription.as_ref().is_some_and(|sub| !sub.watched().is_empty())
	}

	/// Uris currently watched.
	pub fn watched(&self) -> &[Uri] {
		self.subscription.as_ref().map_or(&[], |sub| sub.watched())
	}

	/// Registers interest after a new result identity was delivered.
	pub fn on_new_data(&mut self, cursor_uri: Option<&Uri>) {
		let sub = self.subscription.get_or_insert_with(|| self.notifier.subscribe());
		if let Some(uri) = cursor_uri {
			sub.watch(uri.clone());
		}
		if !self.extra_registered {
			for uri in &self.extra_uris {
				sub.watch(uri.clone());
			}
			self.extra_registered = true;
		}
	}

	/// Stops watching everything.
	pub fn unregister(&mut self) {
		if let Some(sub) = self.subscription.as_mut() {
			sub.unwatch_all();
		}
		self.extra_registered = false;
	}

	/// Drains pending notifications; true if an enabled observer saw a change.
	pub fn take_changed(&mut self) -> bool {
		let Some(sub) = self.subscription.as_mut() else {
			return false;
		};
		sub.take_changed() && self.enabled
	}

	/// Waits for the next watched change. Never resolves without a subscription.
	pub async fn changed(&mut self) -> Option<Uri> {
		match self.subscription.as_mut() {
			Some(sub) => sub.changed().await,
			None => std::future::pending().await,
		}
	}
}
