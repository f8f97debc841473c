use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TsMetadata {
	pub uid: i32,
	pub name: String,
	pub description: Option<String>,
	pub unit: Option<String>,
	pub source_uid: String,
	pub uid_from_source: String,
	pub successful_last_update_time: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TsDatapoint {
	pub uid: i32,
	pub time: OffsetDateTime,
	pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TsToTag {
	pub ts_uid: i32,
	pub tag_uid: i32,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct TsToMetric {
	pub ts_uid: i32,
	pub metric_uid: i32,
	pub value: f64,
	/// JSON encoded auxiliary payload, decoded during assembly.
	pub data_json: Option<String>,
}

/// One chartop rank position: the combined metric value and the series that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
	pub metric_value: f64,
	pub operands: Vec<TsMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TsWithVector {
	pub metadata: TsMetadata,
	pub visualization_vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Tag {
	pub uid: i32,
	pub name: String,
	pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Metric {
	pub uid: i32,
	pub name: String,
	pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AllOrAnyTags {
	All,
	#[default]
	Any,
}
