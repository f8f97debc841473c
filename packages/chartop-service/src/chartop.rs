use serde::Serialize;

use chartop_storage::{
	connector::{FilterQuery, TsdbSession},
	models::RankedEntry,
};

use crate::{
	ChartopService, Result, TimeseriesExternal, TimeseriesRequest,
	error::upstream,
	lookups::{self, FanOut, JoinRows, Lookups},
	release,
	timeseries::FILTER_FAILED,
};

const OPERATION: &str = "get_chartop";

/// One rank position with every series that contributed to its value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartopEntryExternal {
	pub operands: Vec<TimeseriesExternal>,
	pub order_by_metric_value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartopPage {
	pub chartop_entries: Vec<ChartopEntryExternal>,
	pub order_by_metric_uid: i32,
}

impl ChartopService {
	pub async fn get_chartop(&self, req: TimeseriesRequest) -> Result<ChartopPage> {
		let query = req.filter_query()?;
		let mut session = self.acquire(OPERATION, FILTER_FAILED).await?;
		let fetched = fetch_ranking(session.as_mut(), &query, self.metric_uids()).await;

		release(session, OPERATION).await;

		let (entries, rows) = fetched.map_err(|err| upstream(OPERATION, FILTER_FAILED, err))?;
		let lookups = Lookups::new(rows);
		let mut chartop_entries = Vec::with_capacity(entries.len());

		for entry in &entries {
			let operands = entry
				.operands
				.iter()
				.map(|operand| lookups.assemble(operand))
				.collect::<Result<Vec<_>, _>>()
				.map_err(|err| upstream(OPERATION, FILTER_FAILED, err))?;

			chartop_entries
				.push(ChartopEntryExternal { operands, order_by_metric_value: entry.metric_value });
		}

		Ok(ChartopPage { chartop_entries, order_by_metric_uid: req.order_by })
	}
}

async fn fetch_ranking(
	session: &mut dyn TsdbSession,
	query: &FilterQuery,
	metric_uids: &[i32],
) -> chartop_storage::Result<(Vec<RankedEntry>, JoinRows)> {
	let entries = session.get_ranked_entities(query).await?;
	let uids = lookups::unique_uids(entries.iter().flat_map(|entry| entry.operands.iter()));

	tracing::debug!(
		operation = OPERATION,
		entry_count = entries.len(),
		ts_count = uids.len(),
		"Ranked chartop entries."
	);

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

	Ok((entries, rows))
}
