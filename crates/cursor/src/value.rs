/// One cell of a cursor row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
	#[default]
	Null,
	Integer(i64),
	Real(f64),
	Text(String),
	Blob(Vec<u8>),
}

impl Value {
	/// Storage class name used in error messages.
	pub const fn type_name(&self) -> &'static str {
		match self {
			Self::Null => "null",
			Self::Integer(_) => "integer",
			Self::Real(_) => "real",
			Self::Text(_) => "text",
			Self::Blob(_) => "blob",
		}
	}

	pub const fn is_null(&self) -> bool {
		matches!(self, Self::Null)
	}
}

impl From<i64> for Value {
	fn from(v: i64) -> Self {
		Self::Integer(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Self {
		Self::Integer(i64::from(v))
	}
}

impl From<f64> for Value {
	fn from(v: f64) -> Self {
		Self::Real(v)
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Self {
		Self::Text(v.to_string())
	}
}

impl From<String> for Value {
	fn from(v: String) -> Self {
		Self::Text(v)
	}
}

impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Self {
		Self::Blob(v)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(v: Option<T>) -> Self {
		v.map_or(Self::Null, Into::into)
	}
}
