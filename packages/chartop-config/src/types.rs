use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	#[serde(default)]
	pub catalog: Catalog,
	#[serde(default)]
	pub api: Api,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// Metric uids requested by every metric association query, inclusive on both ends.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Catalog {
	pub metric_uid_min: i32,
	pub metric_uid_max: i32,
}
impl Catalog {
	pub fn metric_uids(&self) -> Vec<i32> {
		(self.metric_uid_min..=self.metric_uid_max).collect()
	}
}
impl Default for Catalog {
	fn default() -> Self {
		Self { metric_uid_min: 1, metric_uid_max: 15 }
	}
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Api {
	pub max_page_number: u32,
	pub max_page_size: u32,
	/// Origins allowed by CORS. Empty disables cross-origin access.
	pub allow_origins: Vec<String>,
}
impl Default for Api {
	fn default() -> Self {
		Self { max_page_number: 4, max_page_size: 50, allow_origins: Vec::new() }
	}
}
