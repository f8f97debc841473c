use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use chartop_storage::{
	connector::{NeighborQuery, TsdbSession},
	models::TsWithVector,
};

use crate::{
	ChartopService, Error, Result, TimeseriesExternal,
	error::{invalid_request, upstream},
	lookups::{self, FanOut, JoinRows, Lookups},
	release,
};

const OPERATION: &str = "get_visualization_vectors";
const SEARCH_FAILED: &str = "Failed to get timeseries with visualization vectors.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisualizationVectorsRequest {
	#[serde(default)]
	pub origin_vector: Option<Vec<f32>>,
	#[serde(default)]
	pub origin_ts_uid: Option<i32>,
	/// Maximum L2 distance from the origin.
	pub radius: f64,
	pub limit: u32,
	#[serde(default)]
	pub exclude_ts_uids: Option<Vec<i32>>,
	/// Only datapoints at or after this instant are returned.
	#[serde(default, with = "crate::time_serde")]
	pub start_date: Option<OffsetDateTime>,
}
impl VisualizationVectorsRequest {
	fn neighbor_query(&self) -> Result<NeighborQuery> {
		match (&self.origin_vector, self.origin_ts_uid) {
			(Some(_), None) | (None, Some(_)) => {},
			_ =>
				return Err(invalid_request(
					"Specify exactly one of 'origin_vector', 'origin_ts_uid'.",
				)),
		}

		if self.origin_vector.as_ref().is_some_and(Vec::is_empty) {
			return Err(invalid_request("origin_vector must not be empty."));
		}
		if !self.radius.is_finite() || self.radius <= 0.0 {
			return Err(invalid_request("radius must be a positive number."));
		}
		if self.limit == 0 {
			return Err(invalid_request("limit must be one or greater."));
		}

		Ok(NeighborQuery {
			origin_vector: self.origin_vector.clone(),
			origin_ts_uid: self.origin_ts_uid,
			radius: self.radius,
			limit: i64::from(self.limit),
			exclude_ts_uids: self.exclude_ts_uids.clone(),
		})
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TsWithVisualizationVectorExternal {
	#[serde(flatten)]
	pub timeseries: TimeseriesExternal,
	pub visualization_vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizationVectors {
	pub ts_with_visualization_vectors: Vec<TsWithVisualizationVectorExternal>,
	/// Vector of the origin series. `None` when the caller supplied the vector itself.
	pub origin: Option<Vec<f32>>,
}

impl ChartopService {
	pub async fn get_visualization_vectors(
		&self,
		req: VisualizationVectorsRequest,
	) -> Result<VisualizationVectors> {
		let query = req.neighbor_query()?;
		let mut session = self.acquire(OPERATION, SEARCH_FAILED).await?;
		let fetched =
			fetch_neighbors(session.as_mut(), &query, self.metric_uids(), req.start_date).await;

		release(session, OPERATION).await;

		let (neighbors, rows) = fetched.map_err(|err| upstream(OPERATION, SEARCH_FAILED, err))?;
		let lookups = Lookups::new(rows);
		let mut ts_with_visualization_vectors = Vec::with_capacity(neighbors.len());

		for neighbor in neighbors {
			let timeseries = lookups
				.assemble(&neighbor.metadata)
				.map_err(|err| upstream(OPERATION, SEARCH_FAILED, err))?;

			ts_with_visualization_vectors.push(TsWithVisualizationVectorExternal {
				timeseries,
				visualization_vector: neighbor.visualization_vector,
			});
		}

		let origin = resolve_origin(req.origin_ts_uid, &ts_with_visualization_vectors)?;

		Ok(VisualizationVectors { ts_with_visualization_vectors, origin })
	}
}

async fn fetch_neighbors(
	session: &mut dyn TsdbSession,
	query: &NeighborQuery,
	metric_uids: &[i32],
	start_date: Option<OffsetDateTime>,
) -> chartop_storage::Result<(Vec<TsWithVector>, JoinRows)> {
	let neighbors = session.get_vector_neighbors(query).await?;
	let uids = lookups::unique_uids(neighbors.iter().map(|neighbor| &neighbor.metadata));

	tracing::debug!(operation = OPERATION, ts_count = uids.len(), "Found vector neighbors.");

	let rows = lookups::fetch_join_rows(
		session,
		FanOut { uids: &uids, metric_uids, start_date, with_tags: false, with_membership: false },
	)
	.await?;

	Ok((neighbors, rows))
}

/// Picks the vector of the origin series out of the search results.
///
/// Without an origin uid there is nothing to resolve and the origin stays `None`.
pub fn resolve_origin(
	origin_ts_uid: Option<i32>,
	results: &[TsWithVisualizationVectorExternal],
) -> Result<Option<Vec<f32>>> {
	let Some(uid) = origin_ts_uid else {
		return Ok(None);
	};

	results
		.iter()
		.find(|result| result.timeseries.metadata.uid == uid)
		.map(|result| Some(result.visualization_vector.clone()))
		.ok_or_else(|| Error::NotFound {
			message: format!("Failed to locate origin TS UID {uid}."),
			data: Some(serde_json::json!({ "origin_ts_uid": uid })),
		})
}
