#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use cola_cursor::{Cursor, CursorError, MatrixCursor, QueryData, SharedCursor, Uri, Value};
use cola_loader::{CancelSignal, DataSource, FetchError, LoadError, LoaderCallbacks};

const GATE_TIMEOUT: Duration = Duration::from_secs(10);

/// One-shot barrier for parking background work at a chosen point.
#[derive(Debug, Default)]
pub struct Gate {
	open: Mutex<bool>,
	cv: Condvar,
	entered: AtomicUsize,
}

impl Gate {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Blocks the calling worker until [`Gate::open`].
	pub fn wait(&self) {
		self.entered.fetch_add(1, Ordering::SeqCst);
		let mut open = self.open.lock().unwrap();
		while !*open {
			let (guard, timeout) = self.cv.wait_timeout(open, GATE_TIMEOUT).unwrap();
			assert!(!timeout.timed_out(), "gate never opened");
			open = guard;
		}
	}

	pub fn open(&self) {
		*self.open.lock().unwrap() = true;
		self.cv.notify_all();
	}

	/// Resolves once `n` workers are waiting at (or went through) the gate.
	pub async fn entered(&self, n: usize) {
		tokio::time::timeout(GATE_TIMEOUT, async {
			while self.entered.load(Ordering::SeqCst) < n {
				tokio::time::sleep(Duration::from_millis(1)).await;
			}
		})
		.await
		.expect("worker never reached the gate");
	}
}

/// Cursor double counting how often it is closed.
#[derive(Debug)]
pub struct CountingCursor {
	inner: MatrixCursor,
	closes: AtomicUsize,
}

impl CountingCursor {
	pub fn new(query_no: i64, rows: i64, uri: &Uri) -> Self {
		let mut inner = MatrixCursor::new(["query", "row"]);
		for row in 0..rows {
			inner.add_row([query_no, row]).expect("two columns");
		}
		inner.set_notification_uri(uri.clone());
		Self {
			inner,
			closes: AtomicUsize::new(0),
		}
	}

	pub fn closes(&self) -> usize {
		self.closes.load(Ordering::SeqCst)
	}
}

impl Cursor for CountingCursor {
	fn columns(&self) -> &[String] {
		self.inner.columns()
	}

	fn count(&self) -> usize {
		self.inner.count()
	}

	fn value(&self, position: usize, column: usize) -> Result<Value, CursorError> {
		self.inner.value(position, column)
	}

	fn close(&self) -> Result<(), CursorError> {
		self.closes.fetch_add(1, Ordering::SeqCst);
		self.inner.close()
	}

	fn is_closed(&self) -> bool {
		self.inner.is_closed()
	}

	fn notification_uri(&self) -> Option<&Uri> {
		self.inner.notification_uri()
	}
}

/// Source producing a fresh [`CountingCursor`] per query; queries are numbered from 1.
#[derive(Clone, Default)]
pub struct CountingSource {
	opened: Arc<Mutex<Vec<Arc<CountingCursor>>>>,
	rows: i64,
	fetch_gate: Option<(usize, Arc<Gate>)>,
	failing_fetch: Option<usize>,
}

impl CountingSource {
	pub fn with_rows(rows: i64) -> Self {
		Self {
			rows,
			..Self::default()
		}
	}

	/// Makes query number `query_no` block inside the fetch until `gate` opens.
	pub fn block_fetch(mut self, query_no: usize, gate: Arc<Gate>) -> Self {
		self.fetch_gate = Some((query_no, gate));
		self
	}

	/// Makes query number `query_no` fail once its fetch is done, after any gate.
	pub fn fail_fetch(mut self, query_no: usize) -> Self {
		self.failing_fetch = Some(query_no);
		self
	}

	pub fn opened(&self) -> Vec<Arc<CountingCursor>> {
		self.opened.lock().unwrap().clone()
	}

	pub fn queries(&self) -> usize {
		self.opened.lock().unwrap().len()
	}

	/// Total close calls over every cursor handed out.
	pub fn total_closes(&self) -> usize {
		self.opened().iter().map(|c| c.closes()).sum()
	}
}

impl DataSource for CountingSource {
	fn query(&self, query: &QueryData, _: &CancelSignal) -> Result<SharedCursor, FetchError> {
		let (query_no, cursor) = {
			let mut opened = self.opened.lock().unwrap();
			let query_no = opened.len() + 1;
			let cursor = Arc::new(CountingCursor::new(query_no as i64, self.rows, &query.uri));
			opened.push(Arc::clone(&cursor));
			(query_no, cursor)
		};
		if let Some((blocked, gate)) = &self.fetch_gate
			&& *blocked == query_no
		{
			gate.wait();
		}
		if self.failing_fetch == Some(query_no) {
			// Never handed out, so the loader has nothing to release for it.
			cursor.close()?;
			return Err(FetchError::from_source(format!("query {query_no} failed")));
		}
		Ok(cursor)
	}
}

#[derive(Debug)]
pub enum Event<T> {
	Finished(Arc<T>),
	Failed(String),
	Reset,
}

/// Consumer double recording every callback.
pub struct Recorder<T> {
	events: Arc<Mutex<Vec<Event<T>>>>,
}

impl<T> Clone for Recorder<T> {
	fn clone(&self) -> Self {
		Self {
			events: Arc::clone(&self.events),
		}
	}
}

impl<T> Default for Recorder<T> {
	fn default() -> Self {
		Self {
			events: Arc::new(Mutex::new(Vec::new())),
		}
	}
}

impl<T> Recorder<T> {
	pub fn finished(&self) -> Vec<Arc<T>> {
		self.events
			.lock()
			.unwrap()
			.iter()
			.filter_map(|e| match e {
				Event::Finished(result) => Some(Arc::clone(result)),
				_ => None,
			})
			.collect()
	}

	pub fn failures(&self) -> Vec<String> {
		self.events
			.lock()
			.unwrap()
			.iter()
			.filter_map(|e| match e {
				Event::Failed(msg) => Some(msg.clone()),
				_ => None,
			})
			.collect()
	}

	pub fn resets(&self) -> usize {
		self.events.lock().unwrap().iter().filter(|e| matches!(e, Event::Reset)).count()
	}
}

impl<T: Send + Sync> LoaderCallbacks<T> for Recorder<T> {
	fn on_load_finished(&mut self, result: Arc<T>) {
		self.events.lock().unwrap().push(Event::Finished(result));
	}

	fn on_load_failed(&mut self, error: &LoadError) {
		self.events.lock().unwrap().push(Event::Failed(error.to_string()));
	}

	fn on_loader_reset(&mut self) {
		self.events.lock().unwrap().push(Event::Reset);
	}
}

pub fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
