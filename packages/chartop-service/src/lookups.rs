use std::collections::HashSet;

use time::OffsetDateTime;

use chartop_storage::{
	connector::TsdbSession,
	models::{TsDatapoint, TsMetadata, TsToMetric, TsToTag},
};

use crate::{
	assemble::{self, AssembleInput, TimeseriesExternal},
	grouping::{self, Groups},
};

/// Secondary queries issued for one set of series uids.
pub(crate) struct FanOut<'a> {
	pub(crate) uids: &'a [i32],
	pub(crate) metric_uids: &'a [i32],
	pub(crate) start_date: Option<OffsetDateTime>,
	pub(crate) with_tags: bool,
	pub(crate) with_membership: bool,
}

#[derive(Debug, Default)]
pub(crate) struct JoinRows {
	pub(crate) tags: Option<Vec<TsToTag>>,
	pub(crate) metrics: Vec<TsToMetric>,
	pub(crate) datapoints: Vec<TsDatapoint>,
	pub(crate) with_vector: Vec<i32>,
}

/// Secondary rows keyed by series uid, ready for per-series assembly.
pub(crate) struct Lookups {
	tags: Option<Groups<i32, TsToTag>>,
	metrics: Groups<i32, TsToMetric>,
	datapoints: Groups<i32, TsDatapoint>,
	with_vector: HashSet<i32>,
}
impl Lookups {
	pub(crate) fn new(rows: JoinRows) -> Self {
		let JoinRows { tags, metrics, datapoints, with_vector } = rows;

		Self {
			tags: tags.map(|rows| grouping::group_by(rows, |row: &TsToTag| Some(row.ts_uid))),
			metrics: grouping::group_by(metrics, |row: &TsToMetric| Some(row.ts_uid)),
			datapoints: grouping::group_by(datapoints, |row: &TsDatapoint| Some(row.uid)),
			with_vector: with_vector.into_iter().collect(),
		}
	}

	pub(crate) fn assemble(
		&self,
		metadata: &TsMetadata,
	) -> Result<TimeseriesExternal, serde_json::Error> {
		let uid = metadata.uid;

		assemble::assemble(AssembleInput {
			metadata,
			datapoints: self.datapoints.get(&uid),
			tags: self.tags.as_ref().map(|groups| groups.get(&uid)),
			metrics: Some(self.metrics.get(&uid)),
			with_vector: Some(&self.with_vector),
		})
	}
}

/// Runs the secondary queries for `plan.uids` in order: tags, metrics, datapoints, membership.
///
/// An empty uid set issues no queries.
pub(crate) async fn fetch_join_rows(
	session: &mut dyn TsdbSession,
	plan: FanOut<'_>,
) -> chartop_storage::Result<JoinRows> {
	if plan.uids.is_empty() {
		return Ok(JoinRows { tags: plan.with_tags.then(Vec::new), ..Default::default() });
	}

	let tags = if plan.with_tags {
		Some(session.get_tag_associations(plan.uids).await?)
	} else {
		None
	};
	let metrics = session.get_metric_associations(plan.uids, plan.metric_uids).await?;
	let datapoints = session.get_datapoints(plan.uids, true, plan.start_date).await?;
	let with_vector = if plan.with_membership {
		session.get_vector_membership(plan.uids).await?
	} else {
		Vec::new()
	};

	tracing::debug!(
		ts_count = plan.uids.len(),
		metric_rows = metrics.len(),
		datapoint_rows = datapoints.len(),
		"Fetched secondary rows."
	);

	Ok(JoinRows { tags, metrics, datapoints, with_vector })
}

/// Uids of `records` in order, keeping the first occurrence of each.
pub(crate) fn unique_uids<'a, I>(records: I) -> Vec<i32>
where
	I: IntoIterator<Item = &'a TsMetadata>,
{
	let mut seen = HashSet::new();

	records.into_iter().map(|record| record.uid).filter(|uid| seen.insert(*uid)).collect()
}
