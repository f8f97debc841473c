use serde::{Deserialize, Serialize};

use chartop_storage::{
	connector::{FilterQuery, TsdbSession},
	models::{AllOrAnyTags, TsMetadata},
};

use crate::{
	ChartopService, Result, TimeseriesExternal,
	error::{invalid_request, upstream},
	lookups::{self, FanOut, JoinRows, Lookups},
	release,
};

pub(crate) const FILTER_FAILED: &str = "Failed to filter timeseries.";

const OPERATION: &str = "list_timeseries";

/// Paging, ordering and tag filter shared by the listing and chartop views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeseriesRequest {
	pub page_number: u32,
	pub page_size: u32,
	/// Metric uid to order by.
	pub order_by: i32,
	pub order_asc: bool,
	pub tags: Option<Vec<i32>>,
	pub all_or_any_tags: AllOrAnyTags,
}
impl TimeseriesRequest {
	pub(crate) fn filter_query(&self) -> Result<FilterQuery> {
		if self.page_size == 0 {
			return Err(invalid_request("page_size must be one or greater."));
		}

		let limit = i64::from(self.page_size);
		let offset = i64::from(self.page_number)
			.checked_mul(limit)
			.ok_or_else(|| invalid_request("page_number is out of range."))?;

		Ok(FilterQuery {
			order_by_metric_uid: self.order_by,
			order_asc: self.order_asc,
			tag_uids: self.tags.clone(),
			all_or_any_tags: self.all_or_any_tags,
			limit,
			offset,
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesPage {
	pub single_timeseries: Vec<TimeseriesExternal>,
	pub order_by_metric_uid: i32,
}

impl ChartopService {
	pub async fn list_timeseries(&self, req: TimeseriesRequest) -> Result<TimeseriesPage> {
		let query = req.filter_query()?;
		let mut session = self.acquire(OPERATION, FILTER_FAILED).await?;
		let fetched = fetch_listing(session.as_mut(), &query, self.metric_uids()).await;

		release(session, OPERATION).await;

		let (metadata, rows) = fetched.map_err(|err| upstream(OPERATION, FILTER_FAILED, err))?;
		let lookups = Lookups::new(rows);
		let timeseries = metadata
			.iter()
			.map(|record| lookups.assemble(record))
			.collect::<Result<Vec<_>, _>>()
			.map_err(|err| upstream(OPERATION, FILTER_FAILED, err))?;

		Ok(TimeseriesPage { single_timeseries: timeseries, order_by_metric_uid: req.order_by })
	}
}

async fn fetch_listing(
	session: &mut dyn TsdbSession,
	query: &FilterQuery,
	metric_uids: &[i32],
) -> chartop_storage::Result<(Vec<TsMetadata>, JoinRows)> {
	let metadata = session.get_filtered_metadata(query).await?;
	let uids = lookups::unique_uids(&metadata);

	tracing::debug!(operation = OPERATION, ts_count = uids.len(), "Filtered timeseries.");

	let rows = lookups::fetch_join_rows(
		session,
		FanOut {
			uids: &uids,
			metric_uids,
			start_date: None,
			with_tags: true,
			with_membership: true,
		},
	)
	.await?;

	Ok((metadata, rows))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request(page_number: u32, page_size: u32) -> TimeseriesRequest {
		TimeseriesRequest {
			page_number,
			page_size,
			order_by: 2,
			order_asc: false,
			tags: Some(vec![4, 5]),
			all_or_any_tags: AllOrAnyTags::All,
		}
	}

	#[test]
	fn offset_is_page_number_times_page_size() {
		let query = request(3, 5).filter_query().expect("Request should be valid.");

		assert_eq!(query.limit, 5);
		assert_eq!(query.offset, 15);
		assert_eq!(query.order_by_metric_uid, 2);
		assert_eq!(query.tag_uids, Some(vec![4, 5]));
		assert_eq!(query.all_or_any_tags, AllOrAnyTags::All);
	}

	#[test]
	fn zero_page_size_is_rejected() {
		let err = request(0, 0).filter_query().expect_err("Expected invalid request.");

		assert_eq!(err.status_code(), 400);
		assert_eq!(err.public_message(), "page_size must be one or greater.");
	}

	#[test]
	fn overflowing_offset_is_rejected() {
		let err =
			request(u32::MAX, u32::MAX).filter_query().expect_err("Expected invalid request.");

		assert_eq!(err.status_code(), 400);

		let query = request(u32::MAX, 2).filter_query().expect("Request should be valid.");

		assert_eq!(query.offset, i64::from(u32::MAX) * 2);
	}
}
