/// Kind of background work, carried into log fields of every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskClass {
	/// Deferrable work.
	Background,
	/// Queries against a data source.
	#[default]
	IoBlocking,
	/// Transformation-heavy work.
	CpuBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Background => "background",
			Self::IoBlocking => "io_blocking",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}
