use std::sync::Arc;

use chartop_config::Config;
use chartop_service::ChartopService;
use chartop_storage::{connector::TsdbConnector, postgres::PgConnector};

#[derive(Clone)]
pub struct AppState {
	pub service: Arc<ChartopService>,
}
impl AppState {
	pub async fn new(config: Config) -> color_eyre::Result<Self> {
		let connector = PgConnector::connect(&config.storage.postgres).await?;

		Ok(Self::with_connector(config, Arc::new(connector)))
	}

	pub fn with_connector(config: Config, connector: Arc<dyn TsdbConnector>) -> Self {
		Self { service: Arc::new(ChartopService::new(config, connector)) }
	}
}
