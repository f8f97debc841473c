//! Data-access boundary consumed by the service layer.
//!
//! A [`TsdbConnector`] hands out one [`TsdbSession`] per logical read. Sessions are used
//! sequentially by a single request and must be handed back through [`TsdbSession::release`],
//! which discards anything the session did. Nothing in this workspace commits a session.

use std::{future::Future, pin::Pin};

use time::OffsetDateTime;

use crate::{
	Result,
	models::{
		AllOrAnyTags, Metric, RankedEntry, Tag, TsDatapoint, TsMetadata, TsToMetric, TsToTag,
		TsWithVector,
	},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Ordering, tag filtering and pagination shared by the listing and ranking queries.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterQuery {
	pub order_by_metric_uid: i32,
	pub order_asc: bool,
	pub tag_uids: Option<Vec<i32>>,
	pub all_or_any_tags: AllOrAnyTags,
	pub limit: i64,
	pub offset: i64,
}
impl FilterQuery {
	/// Tag filter to apply, treating an empty list the same as no filter.
	pub fn effective_tags(&self) -> Option<&[i32]> {
		self.tag_uids.as_deref().filter(|tags| !tags.is_empty())
	}
}

/// Radius search around an explicit vector or around the vector of an existing series.
#[derive(Debug, Clone, PartialEq)]
pub struct NeighborQuery {
	pub origin_vector: Option<Vec<f32>>,
	pub origin_ts_uid: Option<i32>,
	pub radius: f64,
	pub limit: i64,
	pub exclude_ts_uids: Option<Vec<i32>>,
}

pub trait TsdbConnector
where
	Self: Send + Sync,
{
	fn acquire_session(&self) -> BoxFuture<'_, Result<Box<dyn TsdbSession>>>;
}

pub trait TsdbSession
where
	Self: Send,
{
	fn get_ranked_entities<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, Result<Vec<RankedEntry>>>;

	fn get_filtered_metadata<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, Result<Vec<TsMetadata>>>;

	fn get_tag_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<TsToTag>>>;

	fn get_metric_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		metric_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<TsToMetric>>>;

	fn get_datapoints<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		order_asc: bool,
		start_date: Option<OffsetDateTime>,
	) -> BoxFuture<'a, Result<Vec<TsDatapoint>>>;

	fn get_vector_membership<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<i32>>>;

	fn get_vector_neighbors<'a>(
		&'a mut self,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, Result<Vec<TsWithVector>>>;

	fn get_tags(&mut self) -> BoxFuture<'_, Result<Vec<Tag>>>;

	fn get_metrics(&mut self) -> BoxFuture<'_, Result<Vec<Metric>>>;

	/// Ends the session, rolling back anything it did.
	fn release(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}
