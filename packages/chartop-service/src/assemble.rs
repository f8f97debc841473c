use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use chartop_storage::models::{TsDatapoint, TsMetadata, TsToMetric, TsToTag};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagRef {
	pub uid: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricValue {
	pub uid: i32,
	pub value: f64,
	pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TsMetadataExternal {
	/// Offset from UTC of the first datapoint, in milliseconds.
	pub timezone: i64,
	pub uid: i32,
	pub name: String,
	pub description: Option<String>,
	pub unit: Option<String>,
	pub source_uid: String,
	pub uid_from_source: String,
	/// Milliseconds since the Unix epoch.
	pub successful_last_update_time: i64,
	pub tags: Vec<TagRef>,
	pub metrics: Vec<MetricValue>,
	pub has_vector: bool,
}

/// One series as returned to clients. `timestamps[i]` (ms since epoch) pairs with `values[i]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeseriesExternal {
	pub timestamps: Vec<i64>,
	pub values: Vec<f64>,
	pub metadata: TsMetadataExternal,
}

pub struct AssembleInput<'a> {
	pub metadata: &'a TsMetadata,
	/// Datapoints of this series in the order they should be emitted.
	pub datapoints: &'a [TsDatapoint],
	/// `None` when the view does not carry tags.
	pub tags: Option<&'a [TsToTag]>,
	pub metrics: Option<&'a [TsToMetric]>,
	pub with_vector: Option<&'a HashSet<i32>>,
}

pub fn assemble(input: AssembleInput<'_>) -> Result<TimeseriesExternal, serde_json::Error> {
	let AssembleInput { metadata, datapoints, tags, metrics, with_vector } = input;
	let mut timestamps = Vec::with_capacity(datapoints.len());
	let mut values = Vec::with_capacity(datapoints.len());

	for datapoint in datapoints {
		timestamps.push(to_millis(datapoint.time));
		values.push(datapoint.value);
	}

	let timezone = datapoints
		.first()
		.map(|datapoint| i64::from(datapoint.time.offset().whole_seconds()) * 1_000)
		.unwrap_or(0);
	let tags = tags.unwrap_or_default().iter().map(|row| TagRef { uid: row.tag_uid }).collect();
	let mut metric_values = Vec::new();

	for row in metrics.unwrap_or_default() {
		metric_values.push(MetricValue {
			uid: row.metric_uid,
			value: row.value,
			data: decode_metric_data(row.data_json.as_deref())?,
		});
	}

	Ok(TimeseriesExternal {
		timestamps,
		values,
		metadata: TsMetadataExternal {
			timezone,
			uid: metadata.uid,
			name: metadata.name.clone(),
			description: metadata.description.clone(),
			unit: metadata.unit.clone(),
			source_uid: metadata.source_uid.clone(),
			uid_from_source: metadata.uid_from_source.clone(),
			successful_last_update_time: to_millis(metadata.successful_last_update_time),
			tags,
			metrics: metric_values,
			has_vector: with_vector.is_some_and(|uids| uids.contains(&metadata.uid)),
		},
	})
}

pub fn to_millis(value: OffsetDateTime) -> i64 {
	(value.unix_timestamp_nanos() / 1_000_000) as i64
}

fn decode_metric_data(raw: Option<&str>) -> Result<Option<Value>, serde_json::Error> {
	match raw {
		Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map(Some),
		_ => Ok(None),
	}
}
