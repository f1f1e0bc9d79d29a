use std::fmt;
use std::sync::Arc;

/// Content address used for queries and change notifications.
///
/// Uris are compared as plain strings; hierarchy is expressed with `/`
/// separated segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uri(Arc<str>);

impl Uri {
	pub fn new(uri: impl AsRef<str>) -> Self {
		Self(Arc::from(uri.as_ref().trim_end_matches('/')))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Appends one path segment.
	pub fn join(&self, segment: impl fmt::Display) -> Self {
		Self::new(format!("{}/{segment}", self.0))
	}

	/// Returns true if `self` equals `base` or lies below it.
	pub fn is_descendant_of(&self, base: &Uri) -> bool {
		match self.0.strip_prefix(&*base.0) {
			Some(rest) => rest.is_empty() || rest.starts_with('/'),
			None => false,
		}
	}
}

impl fmt::Display for Uri {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Uri {
	fn from(uri: &str) -> Self {
		Self::new(uri)
	}
}

impl From<String> for Uri {
	fn from(uri: String) -> Self {
		Self::new(uri)
	}
}

/// Everything a data source needs to run one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryData {
	pub uri: Uri,
	pub projection: Option<Vec<String>>,
	pub selection: Option<String>,
	pub selection_args: Vec<String>,
	pub order_by: Option<String>,
}

impl QueryData {
	pub fn new(uri: impl Into<Uri>) -> Self {
		Self {
			uri: uri.into(),
			projection: None,
			selection: None,
			selection_args: Vec::new(),
			order_by: None,
		}
	}

	pub fn projection<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.projection = Some(columns.into_iter().map(Into::into).collect());
		self
	}

	/// Adds a selection clause; repeated calls are joined with `AND`.
	pub fn where_clause<I, A>(mut self, selection: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = A>,
		A: fmt::Display,
	{
		let selection = selection.into();
		self.selection = Some(match self.selection.take() {
			Some(existing) => format!("({existing}) AND ({selection})"),
			None => selection,
		});
		self.selection_args.extend(args.into_iter().map(|a| a.to_string()));
		self
	}

	pub fn order_by(mut self, order: impl Into<String>) -> Self {
		self.order_by = Some(order.into());
		self
	}
}
