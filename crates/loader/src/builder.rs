//! Fluent construction of loaders.
//!
//! A chain starts at [`CursorLoaderBuilder`] (query description), optionally
//! turns row-wise through [`RowLoaderBuilder`], and continues with result-level
//! stages on [`TransformedLoaderBuilder`]. Stages run in the order they were
//! added.

use std::fmt;
use std::sync::Arc;

use cola_cursor::{CursorError, DEFAULT_LAZY_CACHE, LazyRowList, QueryData, Row, RowFn, SharedCursor, Uri};

use crate::error::StageError;
use crate::pipeline::{Stage, collect_rows, cursor_stage, then};
use crate::{BoxError, CancelSignal, Cancelled, ComposedLoader, DataSource, LoaderCallbacks, LoaderContext, Pipeline, TransformError};

/// Query and observation settings shared along a builder chain.
#[derive(Debug, Clone)]
struct Plan {
	query: QueryData,
	notification_uris: Vec<Uri>,
	stages: usize,
}

impl Plan {
	fn add_notification_uri(&mut self, uri: Uri) {
		if !self.notification_uris.contains(&uri) {
			self.notification_uris.push(uri);
		}
	}
}

/// Describes the query; the starting point of every loader.
#[derive(Debug, Clone)]
pub struct CursorLoaderBuilder {
	plan: Plan,
}

impl CursorLoaderBuilder {
	pub fn for_uri(uri: impl Into<Uri>) -> Self {
		Self::for_query(QueryData::new(uri))
	}

	pub fn for_query(query: QueryData) -> Self {
		Self {
			plan: Plan {
				query,
				notification_uris: Vec::new(),
				stages: 0,
			},
		}
	}

	pub fn projection<I, S>(mut self, columns: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		self.plan.query = self.plan.query.projection(columns);
		self
	}

	pub fn where_clause<I, A>(mut self, selection: impl Into<String>, args: I) -> Self
	where
		I: IntoIterator<Item = A>,
		A: fmt::Display,
	{
		self.plan.query = self.plan.query.where_clause(selection, args);
		self
	}

	pub fn order_by(mut self, order: impl Into<String>) -> Self {
		self.plan.query = self.plan.query.order_by(order);
		self
	}

	/// Reload when this uri (or a descendant) changes, once data was delivered.
	pub fn add_notification_uri(mut self, uri: impl Into<Uri>) -> Self {
		self.plan.add_notification_uri(uri.into());
		self
	}

	pub fn query(&self) -> &QueryData {
		&self.plan.query
	}

	fn into_transformed(self) -> TransformedLoaderBuilder<SharedCursor> {
		TransformedLoaderBuilder {
			plan: self.plan,
			stage: then(cursor_stage(), |cursor: SharedCursor, _: &SharedCursor, _: &CancelSignal| Ok(Arc::new(cursor))),
		}
	}

	pub fn transform<T, F>(self, f: F) -> TransformedLoaderBuilder<T>
	where
		T: Send + Sync + 'static,
		F: Fn(&SharedCursor) -> T + Send + Sync + 'static,
	{
		self.into_transformed().transform(f)
	}

	pub fn try_transform<T, E, F>(self, f: F) -> TransformedLoaderBuilder<T>
	where
		T: Send + Sync + 'static,
		E: Into<BoxError>,
		F: Fn(&SharedCursor) -> Result<T, E> + Send + Sync + 'static,
	{
		self.into_transformed().try_transform(f)
	}

	pub fn cancellable_transform<T, F>(self, f: F) -> TransformedLoaderBuilder<T>
	where
		T: Send + Sync + 'static,
		F: Fn(&SharedCursor, &CancelSignal) -> Result<T, Cancelled> + Send + Sync + 'static,
	{
		self.into_transformed().cancellable_transform(f)
	}

	/// Stage returning an `Arc` as is, so a cached instance can be handed back.
	pub fn transform_shared<T, F>(self, f: F) -> TransformedLoaderBuilder<T>
	where
		T: Send + Sync + 'static,
		F: Fn(&SharedCursor) -> Arc<T> + Send + Sync + 'static,
	{
		self.into_transformed().transform_shared(f)
	}

	/// Maps every row of the cursor.
	pub fn transform_row<R, F>(self, f: F) -> RowLoaderBuilder<R>
	where
		R: Send + Sync + 'static,
		F: Fn(&Row<'_>) -> Result<R, CursorError> + Send + Sync + 'static,
	{
		RowLoaderBuilder::new(self.plan, Arc::new(f), false)
	}

	/// Like [`Self::transform_row`], checking for cancellation before each row.
	pub fn cancellable_transform_row<R, F>(self, f: F) -> RowLoaderBuilder<R>
	where
		R: Send + Sync + 'static,
		F: Fn(&Row<'_>) -> Result<R, CursorError> + Send + Sync + 'static,
	{
		RowLoaderBuilder::new(self.plan, Arc::new(f), true)
	}

	pub fn into_pipeline(self, source: Arc<dyn DataSource>) -> Pipeline<SharedCursor> {
		self.into_transformed().into_pipeline(source)
	}

	/// Loader delivering the fetched cursor itself.
	pub fn build(self, ctx: &LoaderContext, callbacks: impl LoaderCallbacks<SharedCursor> + 'static) -> ComposedLoader<SharedCursor> {
		self.into_transformed().build(ctx, callbacks)
	}
}

/// Row-wise stages; ends in an eager `Vec` or a [`LazyRowList`].
pub struct RowLoaderBuilder<R> {
	plan: Plan,
	row_fn: RowFn<R>,
	cancellable: bool,
}

impl<R> fmt::Debug for RowLoaderBuilder<R> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RowLoaderBuilder")
			.field("plan", &self.plan)
			.field("cancellable", &self.cancellable)
			.finish_non_exhaustive()
	}
}

impl<R> RowLoaderBuilder<R>
where
	R: Send + Sync + 'static,
{
	fn new(mut plan: Plan, row_fn: RowFn<R>, cancellable: bool) -> Self {
		plan.stages += 1;
		Self { plan, row_fn, cancellable }
	}

	/// Maps each already transformed row further.
	pub fn transform_row<S, F>(self, f: F) -> RowLoaderBuilder<S>
	where
		S: Send + Sync + 'static,
		F: Fn(R) -> S + Send + Sync + 'static,
	{
		let prev = self.row_fn;
		RowLoaderBuilder::new(self.plan, Arc::new(move |row: &Row<'_>| prev(row).map(&f)), self.cancellable)
	}

	pub fn cancellable_transform_row<S, F>(self, f: F) -> RowLoaderBuilder<S>
	where
		S: Send + Sync + 'static,
		F: Fn(R) -> S + Send + Sync + 'static,
	{
		let mut next = self.transform_row(f);
		next.cancellable = true;
		next
	}

	pub fn add_notification_uri(mut self, uri: impl Into<Uri>) -> Self {
		self.plan.add_notification_uri(uri.into());
		self
	}

	/// Transforms every row up front into a `Vec`.
	pub fn collect(self) -> TransformedLoaderBuilder<Vec<R>> {
		let Self { plan, row_fn, cancellable } = self;
		let stage = then(cursor_stage(), move |cursor: SharedCursor, _: &SharedCursor, signal: &CancelSignal| {
			collect_rows(&cursor, &row_fn, cancellable.then_some(signal)).map(Arc::new)
		});
		TransformedLoaderBuilder { plan, stage }
	}

	/// Transforms rows on access, keeping the cursor open behind the list.
	pub fn lazy(self) -> TransformedLoaderBuilder<LazyRowList<R>> {
		self.lazy_with_capacity(DEFAULT_LAZY_CACHE)
	}

	pub fn lazy_with_capacity(self, capacity: usize) -> TransformedLoaderBuilder<LazyRowList<R>> {
		let Self { plan, row_fn, .. } = self;
		let stage = then(cursor_stage(), move |cursor: SharedCursor, _: &SharedCursor, _: &CancelSignal| {
			Ok(Arc::new(LazyRowList::with_capacity(cursor, Arc::clone(&row_fn), capacity)))
		});
		TransformedLoaderBuilder { plan, stage }
	}

	/// Maps the collected rows.
	pub fn transform<U, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		F: Fn(&[R]) -> U + Send + Sync + 'static,
	{
		self.collect().transform(move |rows: &Vec<R>| f(rows))
	}

	pub fn cancellable_transform<U, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		F: Fn(&[R], &CancelSignal) -> Result<U, Cancelled> + Send + Sync + 'static,
	{
		self.collect().cancellable_transform(move |rows: &Vec<R>, signal: &CancelSignal| f(rows, signal))
	}

	pub fn build(self, ctx: &LoaderContext, callbacks: impl LoaderCallbacks<Vec<R>> + 'static) -> ComposedLoader<Vec<R>> {
		self.collect().build(ctx, callbacks)
	}
}

/// Result-level stages over the output of the previous stage.
pub struct TransformedLoaderBuilder<T> {
	plan: Plan,
	stage: Stage<Arc<T>>,
}

impl<T> fmt::Debug for TransformedLoaderBuilder<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("TransformedLoaderBuilder")
			.field("plan", &self.plan)
			.finish_non_exhaustive()
	}
}

impl<T> TransformedLoaderBuilder<T>
where
	T: Send + Sync + 'static,
{
	fn push<U, F>(self, next: F) -> TransformedLoaderBuilder<U>
	where
		U: 'static,
		F: Fn(Arc<T>, &SharedCursor, &CancelSignal) -> Result<Arc<U>, StageError> + Send + Sync + 'static,
	{
		let Self { mut plan, stage } = self;
		plan.stages += 1;
		TransformedLoaderBuilder {
			plan,
			stage: then(stage, next),
		}
	}

	pub fn transform<U, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		F: Fn(&T) -> U + Send + Sync + 'static,
	{
		self.push(move |input: Arc<T>, _: &SharedCursor, _: &CancelSignal| Ok(Arc::new(f(&input))))
	}

	/// Stage that may fail; the error reaches the consumer as a [`TransformError`].
	pub fn try_transform<U, E, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		E: Into<BoxError>,
		F: Fn(&T) -> Result<U, E> + Send + Sync + 'static,
	{
		self.push(move |input: Arc<T>, _: &SharedCursor, _: &CancelSignal| {
			f(&input)
				.map(Arc::new)
				.map_err(|err| StageError::Failed(TransformError::Stage(err.into())))
		})
	}

	/// Stage that polls the signal and may give up with [`Cancelled`].
	pub fn cancellable_transform<U, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		F: Fn(&T, &CancelSignal) -> Result<U, Cancelled> + Send + Sync + 'static,
	{
		self.push(move |input: Arc<T>, _: &SharedCursor, signal: &CancelSignal| {
			f(&input, signal).map(Arc::new).map_err(StageError::from)
		})
	}

	/// Stage returning an `Arc` as is, so a cached instance can be handed back.
	pub fn transform_shared<U, F>(self, f: F) -> TransformedLoaderBuilder<U>
	where
		U: Send + Sync + 'static,
		F: Fn(&T) -> Arc<U> + Send + Sync + 'static,
	{
		self.push(move |input: Arc<T>, _: &SharedCursor, _: &CancelSignal| Ok(f(&input)))
	}

	pub fn add_notification_uri(mut self, uri: impl Into<Uri>) -> Self {
		self.plan.add_notification_uri(uri.into());
		self
	}

	pub fn into_pipeline(self, source: Arc<dyn DataSource>) -> Pipeline<T> {
		let Plan {
			query,
			notification_uris,
			stages,
		} = self.plan;
		Pipeline::new(source, query, notification_uris, self.stage, stages)
	}

	pub fn build(self, ctx: &LoaderContext, callbacks: impl LoaderCallbacks<T> + 'static) -> ComposedLoader<T> {
		let pipeline = self.into_pipeline(Arc::clone(ctx.source()));
		ComposedLoader::new(pipeline, ctx.notifier().clone(), ctx.config().clone(), Box::new(callbacks))
	}
}
