use std::collections::HashMap;

use sqlx::{PgPool, Postgres, QueryBuilder, Transaction, postgres::PgPoolOptions};
use time::OffsetDateTime;

use crate::{
	Error, Result,
	connector::{BoxFuture, FilterQuery, NeighborQuery, TsdbConnector, TsdbSession},
	models::{
		AllOrAnyTags, Metric, RankedEntry, Tag, TsDatapoint, TsMetadata, TsToMetric, TsToTag,
		TsWithVector,
	},
	schema,
};

const METADATA_COLUMNS: &str = "m.uid, m.name, m.description, m.unit, m.source_uid, \
	m.uid_from_source, m.successful_last_update_time";

pub struct PgConnector {
	pub pool: PgPool,
}
impl PgConnector {
	pub async fn connect(cfg: &chartop_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	/// Creates the tables read by the connector. Only used to bootstrap test databases.
	pub async fn ensure_schema(&self) -> Result<()> {
		let lock_id: i64 = 7_120_115;
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(lock_id).execute(&mut *tx).await?;

		let mut applied = 0_usize;

		for statement in schema::statements(schema::render_schema()) {
			sqlx::query(statement).execute(&mut *tx).await?;

			applied += 1;
		}

		tx.commit().await?;

		tracing::info!(statements = applied, "Schema ensured.");

		Ok(())
	}
}
impl TsdbConnector for PgConnector {
	fn acquire_session(&self) -> BoxFuture<'_, Result<Box<dyn TsdbSession>>> {
		Box::pin(async move {
			let mut tx = self.pool.begin().await?;

			sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;

			Ok(Box::new(PgSession { tx }) as Box<dyn TsdbSession>)
		})
	}
}

/// One read-only transaction. Dropping it without [`TsdbSession::release`] also rolls back.
pub struct PgSession {
	tx: Transaction<'static, Postgres>,
}
impl TsdbSession for PgSession {
	fn get_ranked_entities<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, Result<Vec<RankedEntry>>> {
		Box::pin(async move {
			check_window(query)?;

			let mut builder = QueryBuilder::<Postgres>::new(
				"SELECT e.entry_uid, e.metric_value FROM chartop_entries e WHERE e.metric_uid = ",
			);

			builder.push_bind(query.order_by_metric_uid);
			builder.push(
				" AND EXISTS (SELECT 1 FROM chartop_entry_operands p \
				 WHERE p.entry_uid = e.entry_uid",
			);
			push_tag_filter(&mut builder, "p.ts_uid", query);
			builder.push(") ORDER BY e.metric_value ");
			builder.push(direction(query.order_asc));
			builder.push(", e.entry_uid");
			push_window(&mut builder, query);

			let entries: Vec<EntryRow> =
				builder.build_query_as().fetch_all(&mut *self.tx).await?;

			if entries.is_empty() {
				return Ok(Vec::new());
			}

			let entry_uids = entries.iter().map(|entry| entry.entry_uid).collect::<Vec<_>>();
			let sql = format!(
				"\
SELECT p.entry_uid, {METADATA_COLUMNS}
FROM chartop_entry_operands p
JOIN timeseries_metadata m ON m.uid = p.ts_uid
WHERE p.entry_uid = ANY($1)
ORDER BY p.entry_uid, p.position"
			);
			let operand_rows: Vec<OperandRow> =
				sqlx::query_as(&sql).bind(&entry_uids).fetch_all(&mut *self.tx).await?;
			let mut operands_by_entry: HashMap<i64, Vec<TsMetadata>> = HashMap::new();

			for row in operand_rows {
				operands_by_entry.entry(row.entry_uid).or_default().push(row.metadata);
			}

			Ok(entries
				.into_iter()
				.map(|entry| RankedEntry {
					metric_value: entry.metric_value,
					operands: operands_by_entry.remove(&entry.entry_uid).unwrap_or_default(),
				})
				.collect())
		})
	}

	fn get_filtered_metadata<'a>(
		&'a mut self,
		query: &'a FilterQuery,
	) -> BoxFuture<'a, Result<Vec<TsMetadata>>> {
		Box::pin(async move {
			check_window(query)?;

			let mut builder = QueryBuilder::<Postgres>::new(format!(
				"SELECT {METADATA_COLUMNS} FROM timeseries_metadata m \
				 JOIN timeseries_to_metric o ON o.ts_uid = m.uid AND o.metric_uid = "
			));

			builder.push_bind(query.order_by_metric_uid);
			builder.push(" WHERE TRUE");
			push_tag_filter(&mut builder, "m.uid", query);
			builder.push(" ORDER BY o.value ");
			builder.push(direction(query.order_asc));
			builder.push(", m.uid");
			push_window(&mut builder, query);

			let rows: Vec<TsMetadata> = builder.build_query_as().fetch_all(&mut *self.tx).await?;

			Ok(rows)
		})
	}

	fn get_tag_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<TsToTag>>> {
		Box::pin(async move {
			let rows: Vec<TsToTag> = sqlx::query_as(
				"\
SELECT ts_uid, tag_uid
FROM timeseries_to_tag
WHERE ts_uid = ANY($1)
ORDER BY ts_uid, tag_uid",
			)
			.bind(ts_uids)
			.fetch_all(&mut *self.tx)
			.await?;

			Ok(rows)
		})
	}

	fn get_metric_associations<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		metric_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<TsToMetric>>> {
		Box::pin(async move {
			let rows: Vec<TsToMetric> = sqlx::query_as(
				"\
SELECT ts_uid, metric_uid, value, data_json
FROM timeseries_to_metric
WHERE ts_uid = ANY($1)
	AND metric_uid = ANY($2)
ORDER BY ts_uid, metric_uid",
			)
			.bind(ts_uids)
			.bind(metric_uids)
			.fetch_all(&mut *self.tx)
			.await?;

			Ok(rows)
		})
	}

	fn get_datapoints<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
		order_asc: bool,
		start_date: Option<OffsetDateTime>,
	) -> BoxFuture<'a, Result<Vec<TsDatapoint>>> {
		Box::pin(async move {
			let sql = format!(
				"\
SELECT ts_uid AS uid, time, value
FROM timeseries_data
WHERE ts_uid = ANY($1)
	AND ($2::timestamptz IS NULL OR time >= $2)
ORDER BY ts_uid, time {}",
				direction(order_asc)
			);
			let rows: Vec<TsDatapoint> = sqlx::query_as(&sql)
				.bind(ts_uids)
				.bind(start_date)
				.fetch_all(&mut *self.tx)
				.await?;

			Ok(rows)
		})
	}

	fn get_vector_membership<'a>(
		&'a mut self,
		ts_uids: &'a [i32],
	) -> BoxFuture<'a, Result<Vec<i32>>> {
		Box::pin(async move {
			let uids: Vec<i32> = sqlx::query_scalar(
				"SELECT ts_uid FROM visualization_vectors WHERE ts_uid = ANY($1) ORDER BY ts_uid",
			)
			.bind(ts_uids)
			.fetch_all(&mut *self.tx)
			.await?;

			Ok(uids)
		})
	}

	fn get_vector_neighbors<'a>(
		&'a mut self,
		query: &'a NeighborQuery,
	) -> BoxFuture<'a, Result<Vec<TsWithVector>>> {
		Box::pin(async move {
			if query.origin_vector.is_some() == query.origin_ts_uid.is_some() {
				return Err(Error::InvalidArgument(
					"Exactly one of origin_vector and origin_ts_uid is required.".to_string(),
				));
			}
			if query.limit < 0 {
				return Err(Error::InvalidArgument("limit must be zero or greater.".to_string()));
			}

			let origin_text = query.origin_vector.as_deref().map(vector_to_pg);
			let exclude = query.exclude_ts_uids.clone().unwrap_or_default();
			let sql = format!(
				"\
WITH origin AS (
	SELECT COALESCE(
		$1::text::vector,
		(SELECT vec FROM visualization_vectors WHERE ts_uid = $2)
	) AS vec
)
SELECT {METADATA_COLUMNS}, v.vec::text AS vector_text
FROM visualization_vectors v
JOIN timeseries_metadata m ON m.uid = v.ts_uid
CROSS JOIN origin o
WHERE (v.vec <-> o.vec) <= $3
	AND NOT (v.ts_uid = ANY($4))
ORDER BY v.vec <-> o.vec, v.ts_uid
LIMIT $5"
			);
			let rows: Vec<NeighborRow> = sqlx::query_as(&sql)
				.bind(origin_text)
				.bind(query.origin_ts_uid)
				.bind(query.radius)
				.bind(&exclude)
				.bind(query.limit)
				.fetch_all(&mut *self.tx)
				.await?;
			let mut out = Vec::with_capacity(rows.len());

			for row in rows {
				out.push(TsWithVector {
					metadata: row.metadata,
					visualization_vector: parse_pg_vector(&row.vector_text)?,
				});
			}

			Ok(out)
		})
	}

	fn get_tags(&mut self) -> BoxFuture<'_, Result<Vec<Tag>>> {
		Box::pin(async move {
			let rows: Vec<Tag> =
				sqlx::query_as("SELECT uid, name, description FROM tags ORDER BY uid")
					.fetch_all(&mut *self.tx)
					.await?;

			Ok(rows)
		})
	}

	fn get_metrics(&mut self) -> BoxFuture<'_, Result<Vec<Metric>>> {
		Box::pin(async move {
			let rows: Vec<Metric> =
				sqlx::query_as("SELECT uid, name, description FROM metrics ORDER BY uid")
					.fetch_all(&mut *self.tx)
					.await?;

			Ok(rows)
		})
	}

	fn release(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
		Box::pin(async move {
			self.tx.rollback().await?;

			Ok(())
		})
	}
}

#[derive(sqlx::FromRow)]
struct EntryRow {
	entry_uid: i64,
	metric_value: f64,
}

#[derive(sqlx::FromRow)]
struct OperandRow {
	entry_uid: i64,
	#[sqlx(flatten)]
	metadata: TsMetadata,
}

#[derive(sqlx::FromRow)]
struct NeighborRow {
	#[sqlx(flatten)]
	metadata: TsMetadata,
	vector_text: String,
}

fn direction(order_asc: bool) -> &'static str {
	if order_asc { "ASC" } else { "DESC" }
}

fn check_window(query: &FilterQuery) -> Result<()> {
	if query.limit < 0 || query.offset < 0 {
		return Err(Error::InvalidArgument(
			"limit and offset must be zero or greater.".to_string(),
		));
	}

	Ok(())
}

fn push_window(builder: &mut QueryBuilder<'_, Postgres>, query: &FilterQuery) {
	builder.push(" LIMIT ");
	builder.push_bind(query.limit);
	builder.push(" OFFSET ");
	builder.push_bind(query.offset);
}

/// ANY keeps series carrying at least one requested tag, ALL keeps series carrying every one.
fn push_tag_filter(
	builder: &mut QueryBuilder<'_, Postgres>,
	ts_uid_column: &str,
	query: &FilterQuery,
) {
	let Some(tags) = query.effective_tags() else {
		return;
	};
	let mut tags = tags.to_vec();

	tags.sort_unstable();
	tags.dedup();

	match query.all_or_any_tags {
		AllOrAnyTags::Any => {
			builder.push(" AND EXISTS (SELECT 1 FROM timeseries_to_tag t WHERE t.ts_uid = ");
			builder.push(ts_uid_column);
			builder.push(" AND t.tag_uid = ANY(");
			builder.push_bind(tags);
			builder.push("))");
		},
		AllOrAnyTags::All => {
			let required = tags.len() as i64;

			builder.push(
				" AND (SELECT count(DISTINCT t.tag_uid) FROM timeseries_to_tag t WHERE t.ts_uid = ",
			);
			builder.push(ts_uid_column);
			builder.push(" AND t.tag_uid = ANY(");
			builder.push_bind(tags);
			builder.push(")) = ");
			builder.push_bind(required);
		},
	}
}

fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::Decode("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut vec = Vec::new();

	for part in without_brackets.split(',') {
		let value: f32 = part
			.trim()
			.parse()
			.map_err(|_| Error::Decode("Vector text contains a non-numeric value.".to_string()))?;

		vec.push(value);
	}

	Ok(vec)
}
