mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use cola_cursor::{QueryData, SharedCursor, Uri, Value};
use cola_loader::{CancelSignal, CursorLoaderBuilder, DataSource, FetchError, Generation, LoaderConfig, LoaderContext, LoaderState};
use common::{CountingSource, Gate, Recorder, init_tracing};
use pretty_assertions::assert_eq;

const PEOPLE: &str = "content://people";

/// Out-of-order completion: the superseded generation finishes last and is dropped.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_generation_finishing_last_is_never_delivered() {
	init_tracing();
	let source = CountingSource::with_rows(3);
	let ctx = LoaderContext::new(source.clone());
	let gate = Gate::new();
	let second_stage = Arc::new(Mutex::new(Vec::new()));
	let recorder = Recorder::default();

	let stage_gate = Arc::clone(&gate);
	let stage_log = Arc::clone(&second_stage);
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.cancellable_transform(move |cursor: &SharedCursor, signal| {
			if signal.generation() == Generation::from_raw(1) {
				stage_gate.wait();
			}
			Ok((signal.generation(), cursor.count()))
		})
		.transform(move |(generation, rows): &(Generation, usize)| {
			stage_log.lock().unwrap().push(*generation);
			(*generation, *rows)
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	let g2 = loader.force_reload().expect("not reset");
	assert_eq!(loader.in_flight(), 2);

	assert!(loader.process_next().await);
	assert_eq!(recorder.finished().iter().map(|r| r.0).collect::<Vec<_>>(), vec![g2]);

	gate.open();
	loader.settle().await;

	assert_eq!(recorder.finished().len(), 1, "g1 is never delivered");
	assert_eq!(*second_stage.lock().unwrap(), vec![g2], "g1 never reached its second stage");
	let opened = source.opened();
	assert_eq!(opened[0].closes(), 1, "g1 cursor released once");
	assert_eq!(opened[1].closes(), 0, "g2 cursor backs the delivered result");
	assert_eq!(loader.state(), LoaderState::Idle);
}

/// Destroy while the only execution is blocked in the fetch.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_during_blocked_fetch_delivers_nothing() {
	init_tracing();
	let gate = Gate::new();
	let source = CountingSource::with_rows(1).block_fetch(1, Arc::clone(&gate));
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE).transform(|cursor| cursor.count()).build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.destroy();
	gate.open();
	loader.settle().await;

	assert!(recorder.finished().is_empty());
	assert!(recorder.failures().is_empty());
	assert_eq!(recorder.resets(), 1);
	assert_eq!(source.opened()[0].closes(), 1, "cursor fetched after destroy is released");
	assert!(loader.is_quiescent());
	assert_eq!(loader.stats().failed, 0);
}

/// Two reloads returning the same cached object over different cursors.
#[tokio::test]
async fn cached_identical_result_releases_exactly_once() {
	let source = CountingSource::with_rows(2);
	let ctx = LoaderContext::new(source.clone());
	let cached = Arc::new(vec!["cached".to_string()]);
	let recorder = Recorder::default();

	let handed_out = Arc::clone(&cached);
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.transform_shared(move |_| Arc::clone(&handed_out))
		.build(&ctx, recorder.clone());

	loader.start_loading();
	loader.settle().await;
	loader.force_reload();
	loader.settle().await;

	let finished = recorder.finished();
	assert_eq!(finished.len(), 2);
	assert!(finished.iter().all(|r| Arc::ptr_eq(r, &cached)));
	assert_eq!(source.total_closes(), 1);
	let opened = source.opened();
	assert_eq!(opened[0].closes(), 0, "first cursor still backs the cached result");
	assert_eq!(opened[1].closes(), 1, "second cursor is a distinct resource");

	loader.destroy();
	assert_eq!(opened[0].closes(), 1);
	assert_eq!(source.total_closes(), 2);
}

/// Same cached object and same cursor from both reloads: one release, at destroy.
#[tokio::test]
async fn cached_result_over_shared_cursor_releases_once_at_destroy() {
	let source = CountingSource::with_rows(1);
	let first: Arc<Mutex<Option<SharedCursor>>> = Arc::default();
	let shared_source = {
		let source = source.clone();
		let first = Arc::clone(&first);
		move |query: &QueryData, signal: &CancelSignal| -> Result<SharedCursor, FetchError> {
			let mut first = first.lock().unwrap();
			if let Some(cursor) = first.as_ref() {
				return Ok(Arc::clone(cursor));
			}
			let cursor = source.query(query, signal)?;
			*first = Some(Arc::clone(&cursor));
			Ok(cursor)
		}
	};
	let ctx = LoaderContext::new(shared_source);
	let cached = Arc::new(0u8);
	let handed_out = Arc::clone(&cached);
	let recorder = Recorder::default();
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.transform_shared(move |_| Arc::clone(&handed_out))
		.build(&ctx, recorder.clone());

	loader.start_loading();
	loader.settle().await;
	loader.force_reload();
	loader.settle().await;
	assert_eq!(recorder.finished().len(), 2);
	assert_eq!(source.total_closes(), 0);

	loader.destroy();
	assert_eq!(source.total_closes(), 1);
	assert_eq!(loader.stats().release_faults, 0);
}

/// Pointer-identical results from a superseded and a current generation.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn identical_superseded_result_keeps_the_delivered_resource() {
	let gate = Gate::new();
	let source = CountingSource::with_rows(1);
	let ctx = LoaderContext::new(source.clone());
	let cached = Arc::new(String::from("same"));
	let recorder = Recorder::default();

	let (handed_out, stage_gate) = (Arc::clone(&cached), Arc::clone(&gate));
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.transform_shared(move |cursor: &SharedCursor| {
			if matches!(cursor.value(0, 0), Ok(Value::Integer(1))) {
				stage_gate.wait();
			}
			Arc::clone(&handed_out)
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.force_reload();
	assert!(loader.process_next().await);
	gate.open();
	loader.settle().await;

	assert_eq!(recorder.finished().len(), 1);
	let opened = source.opened();
	assert_eq!(opened[0].closes(), 1, "superseded cursor released");
	assert_eq!(opened[1].closes(), 0, "delivered cursor kept");
	loader.destroy();
	assert_eq!(opened[1].closes(), 1);
}

/// Stages after a supersession point never start.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_generation_runs_no_later_stage() {
	let gate = Gate::new();
	let source = CountingSource::with_rows(1);
	let ctx = LoaderContext::new(source);
	let log: Arc<Mutex<Vec<(u64, &'static str)>>> = Arc::default();
	let recorder = Recorder::default();

	let (stage_gate, l1, l2, l3) = (Arc::clone(&gate), Arc::clone(&log), Arc::clone(&log), Arc::clone(&log));
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.cancellable_transform(move |_: &SharedCursor, signal| {
			let g = signal.generation().get();
			l1.lock().unwrap().push((g, "first"));
			if g == 1 {
				stage_gate.wait();
			}
			Ok(g)
		})
		.transform(move |g: &u64| {
			l2.lock().unwrap().push((*g, "second"));
			*g
		})
		.transform(move |g: &u64| {
			l3.lock().unwrap().push((*g, "third"));
			*g
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.force_reload();
	gate.open();
	loader.settle().await;

	let g1_stages: Vec<_> = log.lock().unwrap().iter().filter(|(g, _)| *g == 1).map(|(_, s)| *s).collect();
	assert_eq!(g1_stages, vec!["first"]);
	assert_eq!(recorder.finished().iter().map(|r| **r).collect::<Vec<_>>(), vec![2]);
}

/// Destroy while a transform is running: the finished run is suppressed.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn destroy_suppresses_running_transform() {
	let gate = Gate::new();
	let source = CountingSource::with_rows(4);
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();
	let stage_gate = Arc::clone(&gate);
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.transform(move |cursor| {
			stage_gate.wait();
			cursor.count()
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.destroy();
	gate.open();
	loader.settle().await;

	assert!(recorder.finished().is_empty());
	assert_eq!(source.total_closes(), 1);
	assert_eq!(loader.state(), LoaderState::Reset);
}

/// Row-level cancellation stops before the next row.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_row_transform_stops_at_row_boundary() {
	let gate = Gate::new();
	let source = CountingSource::with_rows(5);
	let ctx = LoaderContext::new(source);
	let transformed: Arc<Mutex<Vec<(i64, i64)>>> = Arc::default();
	let recorder = Recorder::default();

	let (row_gate, seen) = (Arc::clone(&gate), Arc::clone(&transformed));
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.cancellable_transform_row(move |row| {
			let (query, position) = (row.get_i64(0)?, row.get_i64(1)?);
			if query == 1 && position == 1 {
				row_gate.wait();
			}
			seen.lock().unwrap().push((query, position));
			Ok(position)
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.force_reload();
	gate.open();
	loader.settle().await;

	let first_query: Vec<i64> = transformed.lock().unwrap().iter().filter(|(q, _)| *q == 1).map(|(_, p)| *p).collect();
	assert_eq!(first_query, vec![0, 1]);
	assert_eq!(recorder.finished().iter().map(|r| r.len()).collect::<Vec<_>>(), vec![5]);
}

/// A watched change reloads a started loader.
#[tokio::test]
async fn notification_triggers_reload() {
	let source = CountingSource::with_rows(1);
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.add_notification_uri("content://groups")
		.build(&ctx, recorder.clone());

	loader.start_loading();
	loader.settle().await;
	assert!(loader.is_listening());

	ctx.notifier().notify_change(&Uri::new("content://groups/3"));
	let handled = tokio::time::timeout(Duration::from_secs(5), loader.process_next()).await.expect("change observed");
	assert!(handled);
	assert!(matches!(loader.state(), LoaderState::Loading(_)));
	loader.settle().await;

	assert_eq!(recorder.finished().len(), 2);
	assert_eq!(source.queries(), 2);
	assert_eq!(source.opened()[0].closes(), 1);
}

/// Changes seen while stopped only mark content as changed.
#[tokio::test]
async fn change_while_stopped_waits_for_start() {
	let source = CountingSource::with_rows(1);
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE).build(&ctx, recorder.clone());

	loader.start_loading();
	loader.settle().await;
	loader.stop_loading();
	loader.on_content_changed();
	assert_eq!(loader.state(), LoaderState::Idle);
	assert_eq!(source.queries(), 1);

	loader.start_loading();
	loader.settle().await;
	assert_eq!(source.queries(), 2);
	assert_eq!(recorder.finished().len(), 2);
}

/// A superseded fetch that fails is swallowed; only the newest result reaches the consumer.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_fetch_failure_is_not_reported() {
	init_tracing();
	let gate = Gate::new();
	let source = CountingSource::with_rows(1).block_fetch(1, Arc::clone(&gate)).fail_fetch(1);
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE).transform(|cursor| cursor.count()).build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.force_reload();
	assert!(loader.process_next().await);
	assert_eq!(recorder.finished().len(), 1);

	gate.open();
	loader.settle().await;

	assert!(recorder.failures().is_empty(), "failures: {:?}", recorder.failures());
	assert_eq!(recorder.finished().len(), 1);
	assert_eq!(loader.stats().failed, 0);
}

/// A superseded stage that fails is swallowed and its cursor released.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn superseded_transform_failure_is_not_reported() {
	init_tracing();
	let gate = Gate::new();
	let source = CountingSource::with_rows(2);
	let ctx = LoaderContext::new(source.clone());
	let recorder = Recorder::default();

	let stage_gate = Arc::clone(&gate);
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.cancellable_transform(|cursor: &SharedCursor, signal| Ok((signal.generation(), cursor.count())))
		.try_transform(move |(generation, rows): &(Generation, usize)| {
			if *generation == Generation::from_raw(1) {
				stage_gate.wait();
				return Err(format!("stage failed for {generation}"));
			}
			Ok(*rows)
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	gate.entered(1).await;
	loader.force_reload();
	gate.open();
	loader.settle().await;

	assert!(recorder.failures().is_empty(), "failures: {:?}", recorder.failures());
	assert_eq!(recorder.finished().iter().map(|r| **r).collect::<Vec<_>>(), vec![2]);
	let opened = source.opened();
	assert_eq!(opened[0].closes(), 1, "failed generation's cursor released");
	assert_eq!(opened[1].closes(), 0);
}

/// However many reloads pile up, at most two executions run at once.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn in_flight_executions_never_exceed_two() {
	init_tracing();
	let gate = Gate::new();
	let source = CountingSource::with_rows(1);
	let ctx = LoaderContext::new(source.clone()).with_config(LoaderConfig::new().with_max_in_flight(5));
	let recorder = Recorder::default();

	let stage_gate = Arc::clone(&gate);
	let mut loader = CursorLoaderBuilder::for_uri(PEOPLE)
		.cancellable_transform(move |_: &SharedCursor, signal| {
			stage_gate.wait();
			Ok(signal.generation())
		})
		.build(&ctx, recorder.clone());

	loader.start_loading();
	loader.force_reload();
	loader.force_reload();
	let newest = loader.force_reload().expect("not reset");
	assert_eq!(loader.in_flight(), 2);
	assert_eq!(loader.state(), LoaderState::Loading(newest));

	gate.open();
	loader.settle().await;

	assert_eq!(recorder.finished().iter().map(|g| **g).collect::<Vec<_>>(), vec![newest]);
	assert_eq!(loader.stats().submitted, 3, "one replaced parked generation never ran");
	// Superseded executions may stop before their fetch; every cursor they did open is released.
	let opened = source.opened();
	assert!(opened.iter().all(|c| c.closes() <= 1));
	assert_eq!(opened.iter().filter(|c| c.closes() == 0).count(), 1);
}
