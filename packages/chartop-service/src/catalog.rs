use chartop_storage::models::{Metric, Tag};

use crate::{ChartopService, Result, error::upstream, release};

const TAGS_FAILED: &str = "Failed to get tags.";
const METRICS_FAILED: &str = "Failed to get metrics.";

impl ChartopService {
	pub async fn get_tags(&self) -> Result<Vec<Tag>> {
		let mut session = self.acquire("get_tags", TAGS_FAILED).await?;
		let fetched = session.get_tags().await;

		release(session, "get_tags").await;

		fetched.map_err(|err| upstream("get_tags", TAGS_FAILED, err))
	}

	pub async fn get_metrics(&self) -> Result<Vec<Metric>> {
		let mut session = self.acquire("get_metrics", METRICS_FAILED).await?;
		let fetched = session.get_metrics().await;

		release(session, "get_metrics").await;

		fetched.map_err(|err| upstream("get_metrics", METRICS_FAILED, err))
	}
}
