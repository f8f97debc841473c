//! In-memory [`TsdbConnector`] for orchestration and router tests.
//!
//! Queries follow the PostgreSQL connector's filtering and ordering rules over a fixed
//! [`Dataset`]. Every call is recorded, sessions are counted, and any query kind can be made to
//! fail.

use std::{
	cmp::Ordering,
	collections::{BTreeMap, HashSet},
	sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use time::{Duration, OffsetDateTime, macros::datetime};

use chartop_storage::{
	Error as StorageError, Result as StorageResult,
	connector::{BoxFuture, FilterQuery, NeighborQuery, TsdbConnector, TsdbSession},
	models::{
		AllOrAnyTags, Metric, RankedEntry, Tag, TsDatapoint, TsMetadata, TsToMetric, TsToTag,
		TsWithVector,
	},
};

#[derive(Debug, Clone, Default)]
pub struct Dataset {
	pub metadata: Vec<TsMetadata>,
	/// Chartop entries per ordering metric uid.
	pub ranked: BTreeMap<i32, Vec<RankedEntry>>,
	pub tags: Vec<TsToTag>,
	pub metrics: Vec<TsToMetric>,
	pub datapoints: Vec<TsDatapoint>,
	pub vectors: Vec<(i32, Vec<f32>)>,
	pub tag_catalog: Vec<Tag>,
	pub metric_catalog: Vec<Metric>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
	Acquire,
	RankedEntities,
	FilteredMetadata,
	TagAssociations,
	MetricAssociations,
	Datapoints,
	VectorMembership,
	VectorNeighbors,
	Tags,
	Metrics,
	Release,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
	RankedEntities(FilterQuery),
	FilteredMetadata(FilterQuery),
	TagAssociations(Vec<i32>),
	MetricAssociations {
		ts_uids: Vec<i32>,
		metric_uids: Vec<i32>,
	},
	Datapoints {
		ts_uids: Vec<i32>,
		order_asc: bool,
		start_date: Option<OffsetDateTime>,
	},
	VectorMembership(Vec<i32>),
	VectorNeighbors(NeighborQuery),
	Tags,
	Metrics,
}
impl Call {
	pub fn kind(&self) -> CallKind {
		match self {
			Self::RankedEntities(_) => CallKind::RankedEntities,
			Self::FilteredMetadata(_) => CallKind::FilteredMetadata,
			Self::TagAssociations(_) => CallKind::TagAssociations,
			Self::MetricAssociations { .. } => CallKind::MetricAssociations,
			Self::Datapoints { .. } => CallKind::Datapoints,
			Self::VectorMembership(_) => CallKind::VectorMembership,
			Self::VectorNeighbors(_) => CallKind::VectorNeighbors,
			Self::Tags => CallKind::Tags,
			Self::Metrics => CallKind::Metrics,
		}
	}

	/// Series uids the call was issued for, if it takes any.
	pub fn ts_uids(&self) -> Option<&[i32]> {
		match self {
			Self::TagAssociations(ts_uids)
			| Self::MetricAssociations { ts_uids, .. }
			| Self::Datapoints { ts_uids, .. }
			| Self::VectorMembership(ts_uids) => Some(ts_uids),
			_ => None,
		}
	}
}

#[derive(Debug, Default)]
struct Journal {
	calls: Vec<Call>,
	acquired: usize,
	released: usize,
	fail_on: HashSet<CallKind>,
}

#[derive(Debug)]
struct Shared {
	dataset: Dataset,
	journal: Mutex<Journal>,
}
impl Shared {
	fn journal(&self) -> MutexGuard<'_, Journal> {
		self.journal.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Records `call` and reports an injected failure for its kind.
	fn enter(&self, call: Call) -> StorageResult<()> {
		let kind = call.kind();
		let mut journal = self.journal();

		journal.calls.push(call);

		injected(&journal, kind)
	}
}

/// Cheap to clone; clones share the dataset and the journal.
#[derive(Debug, Clone)]
pub struct MemoryTsdb {
	shared: Arc<Shared>,
}
impl MemoryTsdb {
	pub fn new(dataset: Dataset) -> Self {
		Self { shared: Arc::new(Shared { dataset, journal: Mutex::new(Journal::default()) }) }
	}

	/// Makes every later call of `kind` fail with a storage error.
	pub fn fail_on(&self, kind: CallKind) {
		self.shared.journal().fail_on.insert(kind);
	}

	pub fn calls(&self) -> Vec<Call> {
		self.shared.journal().calls.clone()
	}

	pub fn acquired(&self) -> usize {
		self.shared.journal().acquired
	}

	pub fn released(&self) -> usize {
		self.shared.journal().released
	}
}
impl TsdbConnector for MemoryTsdb {
	fn acquire_session(&self) -> BoxFuture<'_, StorageResult<Box<dyn TsdbSession>>> {
		Box::pin(async move {
			{
				let mut journal = self.shared.journal();

				injected(&journal, CallKind::Acquire)?;

				journal.acquired += 1;
			}

			Ok(Box::new(MemorySession { shared: self.shared.clone() }) as Box<dyn TsdbSession>)
		})
	}
}

struct MemorySession {
	shared: Arc<Shared>,
}
impl MemorySession {
	fn dataset(&self) -> &Dataset {
		&self.shared.dataset
	}

	fn metadata(&self, uid: i32) -> Option<&TsMetadata> {
		self.dataset().metadata.iter().find(|record| record.uid == uid)
	}

	fn metric_value(&self, ts_uid: i32, metric_uid: i32) -> Option<f64> {
		self.dataset()
			.metrics
			.iter()
			.find(|row| row.ts_uid == ts_uid && row.metric_uid == metric_uid)
			.map(|row| row.value)
	}

	fn matches_tags(&self, ts_uid: i32, query: &FilterQuery) -> bool {
		let Some(wanted) = query.effective_tags() else {
			return true;
		};
		let carried = self
			.dataset()
			.tags
			.iter()
			.filter(|row| row.ts_uid == ts_uid)
			.map(|row| row.tag_uid)
			.collect::<HashSet<_>>();

		match query.all_or_any_tags {
			AllOrAnyTags::Any => wanted.iter().any(|tag| carried.contains(tag)),
			AllOrAnyTags::All => wanted.iter().all(|tag| carried.contains(tag)),
		}
	}

	fn vector(&self, ts_uid: i32) -> Option<&[f32]> {
		self.dataset()
			.vectors
			.iter()
			.find(|(uid, _)| *uid == ts_uid)
			.map(|(_, vector)| vector.as_slice())
	}
}
impl TsdbSession for MemorySession {
	fn get_ranked_entities<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, StorageResult<Vec<RankedEntry>>> {
		Box::pin(async move {
			self.shared.enter(Call::RankedEntities(query.clone()))?;

			let mut entries = self
				.dataset()
				.ranked
				.get(&query.order_by_metric_uid)
				.cloned()
				.unwrap_or_default()
				.into_iter()
				.filter(|entry| {
					entry.operands.iter().any(|operand| self.matches_tags(operand.uid, query))
				})
				.collect::<Vec<_>>();

			entries.sort_by(|a, b| directed(a.metric_value, b.metric_value, query.order_asc));

			Ok(window(entries, query))
		})
	}

	fn get_filtered_metadata<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, StorageResult<Vec<TsMetadata>>> {
		Box::pin(async move {
			self.shared.enter(Call::FilteredMetadata(query.clone()))?;

			let mut ordered = self
				.dataset()
				.metadata
				.iter()
				.filter(|record| self.matches_tags(record.uid, query))
				.filter_map(|record| {
					self.metric_value(record.uid, query.order_by_metric_uid)
						.map(|value| (value, record.clone()))
				})
				.collect::<Vec<_>>();

			ordered.sort_by(|(a, left), (b, right)| {
				directed(*a, *b, query.order_asc).then(left.uid.cmp(&right.uid))
			});

			Ok(window(ordered.into_iter().map(|(_, record)| record).collect(), query))
		})
	}

	fn get_tag_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, StorageResult<Vec<TsToTag>>> {
		Box::pin(async move {
			self.shared.enter(Call::TagAssociations(ts_uids.to_vec()))?;

			let mut rows = self
				.dataset()
				.tags
				.iter()
				.filter(|row| ts_uids.contains(&row.ts_uid))
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by_key(|row| (row.ts_uid, row.tag_uid));

			Ok(rows)
		})
	}

	fn get_metric_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		metric_uids: &'a [i32],
	) -> BoxFuture<'a, StorageResult<Vec<TsToMetric>>> {
		Box::pin(async move {
			self.shared.enter(Call::MetricAssociations {
				ts_uids: ts_uids.to_vec(),
				metric_uids: metric_uids.to_vec(),
			})?;

			let mut rows = self
				.dataset()
				.metrics
				.iter()
				.filter(|row| ts_uids.contains(&row.ts_uid))
				.filter(|row| metric_uids.contains(&row.metric_uid))
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by_key(|row| (row.ts_uid, row.metric_uid));

			Ok(rows)
		})
	}

	fn get_datapoints<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		order_asc: bool,
		start_date: Option<OffsetDateTime>,
	) -> BoxFuture<'a, StorageResult<Vec<TsDatapoint>>> {
		Box::pin(async move {
			self.shared.enter(Call::Datapoints {
				ts_uids: ts_uids.to_vec(),
				order_asc,
				start_date,
			})?;

			let mut rows = self
				.dataset()
				.datapoints
				.iter()
				.filter(|row| ts_uids.contains(&row.uid))
				.filter(|row| start_date.is_none_or(|start| row.time >= start))
				.cloned()
				.collect::<Vec<_>>();

			rows.sort_by(|a, b| {
				let by_time = if order_asc { a.time.cmp(&b.time) } else { b.time.cmp(&a.time) };

				a.uid.cmp(&b.uid).then(by_time)
			});

			Ok(rows)
		})
	}

	fn get_vector_membership<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, StorageResult<Vec<i32>>> {
		Box::pin(async move {
			self.shared.enter(Call::VectorMembership(ts_uids.to_vec()))?;

			let mut uids = self
				.dataset()
				.vectors
				.iter()
				.map(|(uid, _)| *uid)
				.filter(|uid| ts_uids.contains(uid))
				.collect::<Vec<_>>();

			uids.sort_unstable();

			Ok(uids)
		})
	}

	fn get_vector_neighbors<'a>(
		&'a mut self,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, StorageResult<Vec<TsWithVector>>> {
		Box::pin(async move {
			self.shared.enter(Call::VectorNeighbors(query.clone()))?;

			let origin = match (&query.origin_vector, query.origin_ts_uid) {
				(Some(vector), None) => vector.clone(),
				(None, Some(uid)) => match self.vector(uid) {
					Some(vector) => vector.to_vec(),
					None => return Ok(Vec::new()),
				},
				_ =>
					return Err(StorageError::InvalidArgument(
						"Exactly one of origin_vector and origin_ts_uid is required.".to_string(),
					)),
			};
			let excluded = query.exclude_ts_uids.as_deref().unwrap_or_default();
			let mut hits = Vec::new();

			for (uid, vector) in &self.dataset().vectors {
				if excluded.contains(uid) {
					continue;
				}

				let distance = l2_distance(&origin, vector);

				if distance > query.radius {
					continue;
				}

				if let Some(metadata) = self.metadata(*uid) {
					hits.push((
						distance,
						TsWithVector {
							metadata: metadata.clone(),
							visualization_vector: vector.clone(),
						},
					));
				}
			}

			hits.sort_by(|(a, left), (b, right)| {
				a.total_cmp(b).then(left.metadata.uid.cmp(&right.metadata.uid))
			});

			let limit = usize::try_from(query.limit).unwrap_or_default();

			Ok(hits.into_iter().take(limit).map(|(_, hit)| hit).collect())
		})
	}

	fn get_tags(&mut self) -> BoxFuture<'_, StorageResult<Vec<Tag>>> {
		Box::pin(async move {
			self.shared.enter(Call::Tags)?;

			Ok(self.dataset().tag_catalog.clone())
		})
	}

	fn get_metrics(&mut self) -> BoxFuture<'_, StorageResult<Vec<Metric>>> {
		Box::pin(async move {
			self.shared.enter(Call::Metrics)?;

			Ok(self.dataset().metric_catalog.clone())
		})
	}

	fn release(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
		Box::pin(async move {
			let mut journal = self.shared.journal();

			journal.released += 1;

			injected(&journal, CallKind::Release)
		})
	}
}

/// Twelve series (uids 1 to 12) used across the orchestration and router tests.
///
/// - Metric 2 is `uid * 10` for every series, metric 1 is `uid` for even uids, and metric 20
///   (outside the default catalog range) exists for uid 1. Metric 4 on uid 6 carries a
///   `{"window": 7}` payload.
/// - Odd uids carry tag 100, uids divisible by three carry tag 200.
/// - Each series has two datapoints one hour apart starting at `2024-01-01 00:00 UTC` plus `uid`
///   minutes, stored newest first.
/// - Uids 1, 2 and 3 have vectors at distance 0, 0.1 and 0.3 from the origin, uid 4 is far away.
/// - Chartop entries for metric 2: `9.0 -> [3, 1]`, `7.0 -> [1, 2]`, `4.0 -> [5]`.
pub fn sample_dataset() -> Dataset {
	let base = datetime!(2024-01-01 00:00:00 UTC);
	let metadata = (1..=12).map(sample_metadata).collect::<Vec<_>>();
	let mut dataset = Dataset { metadata, ..Default::default() };

	for uid in 1..=12 {
		dataset.metrics.push(TsToMetric {
			ts_uid: uid,
			metric_uid: 2,
			value: f64::from(uid) * 10.0,
			data_json: None,
		});

		if uid % 2 == 0 {
			dataset.metrics.push(TsToMetric {
				ts_uid: uid,
				metric_uid: 1,
				value: f64::from(uid),
				data_json: Some(String::new()),
			});
		}
		if uid % 2 == 1 {
			dataset.tags.push(TsToTag { ts_uid: uid, tag_uid: 100 });
		}
		if uid % 3 == 0 {
			dataset.tags.push(TsToTag { ts_uid: uid, tag_uid: 200 });
		}

		let first = base + Duration::minutes(i64::from(uid));

		dataset.datapoints.push(TsDatapoint {
			uid,
			time: first + Duration::hours(1),
			value: f64::from(uid) + 0.5,
		});
		dataset.datapoints.push(TsDatapoint { uid, time: first, value: f64::from(uid) });
	}

	dataset.metrics.push(TsToMetric { ts_uid: 1, metric_uid: 20, value: 1.0, data_json: None });
	dataset.metrics.push(TsToMetric {
		ts_uid: 6,
		metric_uid: 4,
		value: 0.25,
		data_json: Some(r#"{"window": 7}"#.to_string()),
	});
	dataset.vectors = vec![
		(1, vec![0.0, 0.0]),
		(2, vec![0.1, 0.0]),
		(3, vec![0.3, 0.0]),
		(4, vec![5.0, 5.0]),
	];

	let operands = |uids: &[i32]| -> Vec<TsMetadata> {
		uids.iter().map(|uid| sample_metadata(*uid)).collect()
	};

	dataset.ranked.insert(
		2,
		vec![
			RankedEntry { metric_value: 4.0, operands: operands(&[5]) },
			RankedEntry { metric_value: 9.0, operands: operands(&[3, 1]) },
			RankedEntry { metric_value: 7.0, operands: operands(&[1, 2]) },
		],
	);
	dataset.tag_catalog = vec![
		Tag { uid: 100, name: "odd".to_string(), description: None },
		Tag {
			uid: 200,
			name: "triple".to_string(),
			description: Some("Multiples of three.".to_string()),
		},
	];
	dataset.metric_catalog = vec![
		Metric { uid: 1, name: "half".to_string(), description: None },
		Metric { uid: 2, name: "scaled".to_string(), description: None },
	];

	dataset
}

pub fn sample_metadata(uid: i32) -> TsMetadata {
	TsMetadata {
		uid,
		name: format!("series-{uid}"),
		description: None,
		unit: Some("kWh".to_string()),
		source_uid: "sample".to_string(),
		uid_from_source: format!("sample-{uid}"),
		successful_last_update_time: datetime!(2024-01-02 00:00:00 UTC),
	}
}

fn injected(journal: &Journal, kind: CallKind) -> StorageResult<()> {
	if journal.fail_on.contains(&kind) {
		return Err(StorageError::InvalidArgument(format!("Injected {kind:?} failure.")));
	}

	Ok(())
}

fn directed(a: f64, b: f64, order_asc: bool) -> Ordering {
	if order_asc { a.total_cmp(&b) } else { b.total_cmp(&a) }
}

fn window<T>(rows: Vec<T>, query: &FilterQuery) -> Vec<T> {
	let offset = usize::try_from(query.offset).unwrap_or_default();
	let limit = usize::try_from(query.limit).unwrap_or_default();

	rows.into_iter().skip(offset).take(limit).collect()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
	a.iter()
		.zip(b)
		.map(|(x, y)| {
			let delta = f64::from(*x) - f64::from(*y);

			delta * delta
		})
		.sum::<f64>()
		.sqrt()
}
