//! Composed loader harness.
//!
//! Replays the supersession scenarios against an in-memory table and checks
//! what the consumer saw and what was released:
//! - `a`: a slow generation overtaken by a newer one
//! - `b`: destroy while the only fetch is still running
//! - `c`: two reloads handing back the same cached object
//!
//! Reload cost is measured by the `loader` criterion bench in `cola-loader`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::ensure;
use clap::{Parser, ValueEnum};
use cola_cursor::{MatrixCursor, QueryData, SharedCursor, Value};
use cola_loader::{CancelSignal, ComposedLoader, CursorLoaderBuilder, DataSource, FetchError, LoaderConfig, LoaderContext, LoaderStats};
use cola_worker::TaskClass;
use tracing::info;

/// Harness command line arguments.
#[derive(Parser, Debug)]
#[command(name = "cola-bench")]
#[command(about = "Exercise composed cursor loaders")]
struct Args {
	/// Scenario to run
	#[arg(value_enum, default_value_t = Scenario::All)]
	scenario: Scenario,

	/// Rows in the simulated table
	#[arg(long, default_value_t = 2_000)]
	rows: i64,

	/// Simulated query latency in milliseconds
	#[arg(long, default_value_t = 5)]
	fetch_delay_ms: u64,

	/// Executions allowed in flight per loader
	#[arg(long, default_value_t = 2)]
	max_in_flight: usize,

	/// Worker class for background executions
	#[arg(long, value_enum, default_value_t = Class::IoBlocking)]
	class: Class,

	/// Verbose logging
	#[arg(short, long)]
	verbose: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
	A,
	B,
	C,
	All,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Class {
	Background,
	IoBlocking,
	CpuBlocking,
}

impl From<Class> for TaskClass {
	fn from(class: Class) -> Self {
		match class {
			Class::Background => TaskClass::Background,
			Class::IoBlocking => TaskClass::IoBlocking,
			Class::CpuBlocking => TaskClass::CpuBlocking,
		}
	}
}

/// In-memory table with a cancellable, slow query.
struct TableSource {
	rows: i64,
	delay: Duration,
	queries: AtomicUsize,
}

const DELAY_SLICE: Duration = Duration::from_millis(1);

impl DataSource for TableSource {
	fn query(&self, query: &QueryData, signal: &CancelSignal) -> Result<SharedCursor, FetchError> {
		self.queries.fetch_add(1, Ordering::Relaxed);
		let mut waited = Duration::ZERO;
		while waited < self.delay {
			signal.check()?;
			std::thread::sleep(DELAY_SLICE);
			waited += DELAY_SLICE;
		}

		let mut cursor = MatrixCursor::new(["id", "label"]);
		for id in 0..self.rows {
			signal.check()?;
			cursor.add_row([Value::from(id), Value::from(format!("row-{id}"))])?;
		}
		cursor.set_notification_uri(query.uri.clone());
		Ok(Arc::new(cursor))
	}
}

struct Report {
	name: &'static str,
	deliveries: usize,
	queries: usize,
	stats: LoaderStats,
}

impl Report {
	fn print(&self) {
		let s = &self.stats;
		println!(
			"{} delivered={} queries={} submitted={} suppressed={} cancelled={} released={} faults={}",
			self.name, self.deliveries, self.queries, s.submitted, s.suppressed, s.cancelled, s.released, s.release_faults,
		);
	}
}

struct Harness {
	source: Arc<TableSource>,
	ctx: LoaderContext,
}

impl Harness {
	fn new(args: &Args, delay: Duration) -> Self {
		let source = Arc::new(TableSource {
			rows: args.rows,
			delay,
			queries: AtomicUsize::new(0),
		});
		let config = LoaderConfig::new()
			.with_name("bench")
			.with_task_class(args.class.into())
			.with_max_in_flight(args.max_in_flight);
		let ctx = LoaderContext::from_shared(source.clone()).with_config(config);
		Self { source, ctx }
	}

	fn queries(&self) -> usize {
		self.source.queries.load(Ordering::Relaxed)
	}

	/// Loader summing row ids, with a delivery counter.
	fn summing_loader(&self) -> (ComposedLoader<i64>, Arc<AtomicUsize>) {
		let deliveries = Arc::new(AtomicUsize::new(0));
		let counter = Arc::clone(&deliveries);
		let loader = CursorLoaderBuilder::for_uri("content://bench/items")
			.projection(["id", "label"])
			.cancellable_transform_row(|row| row.get_i64(0))
			.cancellable_transform(|ids, signal| {
				signal.check()?;
				Ok(ids.iter().sum::<i64>())
			})
			.build(&self.ctx, move |_: Arc<i64>| {
				counter.fetch_add(1, Ordering::Relaxed);
			});
		(loader, deliveries)
	}
}

async fn scenario_a(args: &Args) -> anyhow::Result<Report> {
	let harness = Harness::new(args, Duration::from_millis(args.fetch_delay_ms.max(1)));
	let (mut loader, deliveries) = harness.summing_loader();
	loader.start_loading();
	tokio::time::sleep(Duration::from_millis(1)).await;
	let newest = loader.force_reload();
	loader.settle().await;

	let expected: i64 = (0..args.rows).sum();
	ensure!(deliveries.load(Ordering::Relaxed) == 1, "only the newest generation may be delivered");
	ensure!(loader.result().as_deref() == Some(&expected), "delivered result is complete");
	ensure!(loader.current_generation() == newest, "newest generation stays current");

	Ok(Report {
		name: "a",
		deliveries: deliveries.load(Ordering::Relaxed),
		queries: harness.queries(),
		stats: loader.stats(),
	})
}

async fn scenario_b(args: &Args) -> anyhow::Result<Report> {
	let harness = Harness::new(args, Duration::from_millis(args.fetch_delay_ms.max(5)));
	let (mut loader, deliveries) = harness.summing_loader();
	loader.start_loading();
	loader.destroy();
	loader.settle().await;

	ensure!(deliveries.load(Ordering::Relaxed) == 0, "destroyed loader must not deliver");
	ensure!(loader.is_quiescent(), "nothing left running");

	Ok(Report {
		name: "b",
		deliveries: 0,
		queries: harness.queries(),
		stats: loader.stats(),
	})
}

async fn scenario_c(args: &Args) -> anyhow::Result<Report> {
	let harness = Harness::new(args, Duration::from_millis(args.fetch_delay_ms));
	let cached = Arc::new(String::from("cached"));
	let handed_out = Arc::clone(&cached);
	let deliveries = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&deliveries);
	let mut loader = CursorLoaderBuilder::for_uri("content://bench/cached")
		.transform_shared(move |_| Arc::clone(&handed_out))
		.build(&harness.ctx, move |_: Arc<String>| {
			counter.fetch_add(1, Ordering::Relaxed);
		});
	loader.start_loading();
	loader.settle().await;
	loader.force_reload();
	loader.settle().await;

	let stats = loader.stats();
	ensure!(deliveries.load(Ordering::Relaxed) == 2, "both reloads deliver");
	ensure!(stats.released == 1, "duplicate cursor released exactly once, got {}", stats.released);
	ensure!(loader.result().is_some_and(|r| Arc::ptr_eq(&r, &cached)), "cached instance delivered");

	Ok(Report {
		name: "c",
		deliveries: deliveries.load(Ordering::Relaxed),
		queries: harness.queries(),
		stats,
	})
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	setup_tracing(args.verbose);

	info!(scenario = ?args.scenario, rows = args.rows, max_in_flight = args.max_in_flight, "starting cola-bench");

	let all = args.scenario == Scenario::All;
	if all || args.scenario == Scenario::A {
		scenario_a(&args).await?.print();
	}
	if all || args.scenario == Scenario::B {
		scenario_b(&args).await?.print();
	}
	if all || args.scenario == Scenario::C {
		scenario_c(&args).await?.print();
	}
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("COLA_LOG")
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("cola_loader=debug,cola_worker=debug,info")
			} else {
				EnvFilter::new("info")
			}
		});

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
