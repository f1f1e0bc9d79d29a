use std::fmt;
use std::sync::Arc;

use cola_cursor::ChangeNotifier;

use crate::{DataSource, LoaderConfig};

/// Collaborators shared by the loaders of one host: where queries go, where
/// change notifications come from, and the default configuration.
#[derive(Clone)]
pub struct LoaderContext {
	source: Arc<dyn DataSource>,
	notifier: ChangeNotifier,
	config: LoaderConfig,
}

impl fmt::Debug for LoaderContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LoaderContext").field("config", &self.config).finish_non_exhaustive()
	}
}

impl LoaderContext {
	pub fn new(source: impl DataSource + 'static) -> Self {
		Self::from_shared(Arc::new(source))
	}

	pub fn from_shared(source: Arc<dyn DataSource>) -> Self {
		Self {
			source,
			notifier: ChangeNotifier::new(),
			config: LoaderConfig::default(),
		}
	}

	pub fn with_notifier(mut self, notifier: ChangeNotifier) -> Self {
		self.notifier = notifier;
		self
	}

	pub fn with_config(mut self, config: LoaderConfig) -> Self {
		self.config = config;
		self
	}

	pub fn source(&self) -> &Arc<dyn DataSource> {
		&self.source
	}

	pub fn notifier(&self) -> &ChangeNotifier {
		&self.notifier
	}

	pub fn config(&self) -> &LoaderConfig {
		&self.config
	}
}
