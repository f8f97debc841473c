use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::{Table, Value};

use chartop_config::{Config, Error};

const SAMPLE_CONFIG_TEMPLATE_TOML: &str = include_str!("fixtures/sample_config.template.toml");

fn sample_table() -> Table {
	toml::from_str(SAMPLE_CONFIG_TEMPLATE_TOML).expect("Failed to parse template config.")
}

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root = sample_table();
	let mut table = &mut root;

	for part in section.split('.') {
		table = table
			.get_mut(part)
			.and_then(Value::as_table_mut)
			.unwrap_or_else(|| panic!("Template config must include [{section}]."));
	}

	table.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render template config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("chartop_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn load_payload(payload: String) -> chartop_config::Result<Config> {
	let path = write_temp_config(payload);
	let result = chartop_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	result
}

fn expect_validation(payload: String, expected: &str) {
	let err = load_payload(payload).expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error kind: {err:?}");

	let message = err.to_string();

	assert!(message.contains(expected), "Unexpected error message: {message}");
}

#[test]
fn sample_config_loads_and_normalizes_origins() {
	let cfg = load_payload(SAMPLE_CONFIG_TEMPLATE_TOML.to_string())
		.expect("Sample config should load.");

	assert_eq!(cfg.service.http_bind, "127.0.0.1:8443");
	assert_eq!(cfg.storage.postgres.pool_max_conns, 4);
	assert_eq!(cfg.api.allow_origins, vec!["http://localhost:3000".to_string()]);
	assert_eq!(cfg.catalog.metric_uids(), (1..=15).collect::<Vec<i32>>());
}

#[test]
fn catalog_and_api_sections_are_optional() {
	let mut root = sample_table();

	root.remove("catalog");
	root.remove("api");

	let payload = toml::to_string(&root).expect("Failed to render config.");
	let cfg = load_payload(payload).expect("Config without optional sections should load.");

	assert_eq!(cfg.catalog.metric_uid_min, 1);
	assert_eq!(cfg.catalog.metric_uid_max, 15);
	assert_eq!(cfg.api.max_page_number, 4);
	assert_eq!(cfg.api.max_page_size, 50);
	assert!(cfg.api.allow_origins.is_empty());
}

#[test]
fn metric_uid_range_is_configurable() {
	let payload = sample_toml_with("catalog", "metric_uid_max", Value::Integer(3));
	let cfg = load_payload(payload).expect("Config should load.");

	assert_eq!(cfg.catalog.metric_uids(), vec![1, 2, 3]);
}

#[test]
fn metric_uid_min_must_be_positive() {
	expect_validation(
		sample_toml_with("catalog", "metric_uid_min", Value::Integer(0)),
		"catalog.metric_uid_min must be one or greater.",
	);
}

#[test]
fn metric_uid_range_must_not_be_inverted() {
	expect_validation(
		sample_toml_with("catalog", "metric_uid_min", Value::Integer(16)),
		"catalog.metric_uid_min must not exceed catalog.metric_uid_max.",
	);
}

#[test]
fn metric_uid_range_is_bounded() {
	expect_validation(
		sample_toml_with("catalog", "metric_uid_max", Value::Integer(i64::from(i32::MAX))),
		"catalog must not span more than 1024 metric uids.",
	);

	let payload = sample_toml_with("catalog", "metric_uid_max", Value::Integer(1_024));
	let cfg = load_payload(payload).expect("Config should load.");

	assert_eq!(cfg.catalog.metric_uids().len(), 1_024);
}

#[test]
fn pool_max_conns_must_be_positive() {
	expect_validation(
		sample_toml_with("storage.postgres", "pool_max_conns", Value::Integer(0)),
		"storage.postgres.pool_max_conns must be greater than zero.",
	);
}

#[test]
fn dsn_must_be_non_empty() {
	expect_validation(
		sample_toml_with("storage.postgres", "dsn", Value::String("  ".to_string())),
		"storage.postgres.dsn must be non-empty.",
	);
}

#[test]
fn max_page_size_must_be_positive() {
	expect_validation(
		sample_toml_with("api", "max_page_size", Value::Integer(0)),
		"api.max_page_size must be greater than zero.",
	);
}

#[test]
fn missing_file_reports_path() {
	let mut path = env::temp_dir();

	path.push("chartop_config_test_missing.toml");

	let err = chartop_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }));
	assert!(err.to_string().contains("chartop_config_test_missing.toml"));
}

#[test]
fn malformed_toml_is_a_parse_error() {
	let err =
		load_payload("[service\nhttp_bind = 1".to_string()).expect_err("Expected parse error.");

	assert!(matches!(err, Error::ParseConfig { .. }));
}
