mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Api, Catalog, Config, Postgres, Service, Storage};

use std::{fs, path::Path};

/// Largest number of metric uids the catalog range may cover.
pub const MAX_CATALOG_METRICS: i32 = 1_024;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	for (label, value) in [
		("service.http_bind", &cfg.service.http_bind),
		("service.log_level", &cfg.service.log_level),
		("storage.postgres.dsn", &cfg.storage.postgres.dsn),
	] {
		if value.trim().is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}
	}

	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.catalog.metric_uid_min < 1 {
		return Err(Error::Validation {
			message: "catalog.metric_uid_min must be one or greater.".to_string(),
		});
	}
	if cfg.catalog.metric_uid_min > cfg.catalog.metric_uid_max {
		return Err(Error::Validation {
			message: "catalog.metric_uid_min must not exceed catalog.metric_uid_max.".to_string(),
		});
	}
	if cfg.catalog.metric_uid_max - cfg.catalog.metric_uid_min >= MAX_CATALOG_METRICS {
		return Err(Error::Validation {
			message: format!("catalog must not span more than {MAX_CATALOG_METRICS} metric uids."),
		});
	}
	if cfg.api.max_page_size == 0 {
		return Err(Error::Validation {
			message: "api.max_page_size must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.api.allow_origins = cfg
		.api
		.allow_origins
		.iter()
		.map(|origin| origin.trim())
		.filter(|origin| !origin.is_empty())
		.map(str::to_string)
		.collect();
}
