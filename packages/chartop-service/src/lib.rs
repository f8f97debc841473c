pub mod assemble;
pub mod catalog;
pub mod chartop;
pub mod grouping;
pub mod time_serde;
pub mod timeseries;
pub mod vectors;

mod error;
mod lookups;

pub use assemble::{MetricValue, TagRef, TimeseriesExternal, TsMetadataExternal};
pub use chartop::{ChartopEntryExternal, ChartopPage};
pub use error::{Error, Result, UpstreamFault};
pub use timeseries::{TimeseriesPage, TimeseriesRequest};
pub use vectors::{
	TsWithVisualizationVectorExternal, VisualizationVectors, VisualizationVectorsRequest,
};

use std::sync::Arc;

use chartop_config::Config;
use chartop_storage::connector::{TsdbConnector, TsdbSession};

use crate::error::upstream;

/// Read-side orchestration over a [`TsdbConnector`].
///
/// Each operation holds one session for its query phase only and assembles responses after the
/// session has been released.
pub struct ChartopService {
	pub cfg: Config,
	pub connector: Arc<dyn TsdbConnector>,
	metric_uids: Vec<i32>,
}
impl ChartopService {
	pub fn new(cfg: Config, connector: Arc<dyn TsdbConnector>) -> Self {
		let metric_uids = cfg.catalog.metric_uids();

		Self { cfg, connector, metric_uids }
	}

	/// Metric uids requested for every series by the association queries.
	pub fn metric_uids(&self) -> &[i32] {
		&self.metric_uids
	}

	async fn acquire(
		&self,
		operation: &'static str,
		message: &'static str,
	) -> Result<Box<dyn TsdbSession>> {
		self.connector.acquire_session().await.map_err(|err| upstream(operation, message, err))
	}
}

/// Hands a session back. A failure here never replaces the operation's own outcome.
async fn release(session: Box<dyn TsdbSession>, operation: &'static str) {
	if let Err(err) = session.release().await {
		tracing::warn!(operation, error = %err, "Failed to release session.");
	}
}
