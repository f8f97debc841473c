use axum::{
	Json, Router,
	extract::{State, rejection::JsonRejection},
	http::{HeaderValue, Method, StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use axum_extra::extract::{Query, QueryRejection};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;

use chartop_config::Api;
use chartop_service::{
	ChartopPage, TimeseriesPage, TimeseriesRequest, VisualizationVectors,
	VisualizationVectorsRequest,
};
use chartop_storage::models::{AllOrAnyTags, Metric, Tag};

use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u32 = 5;
const MALFORMED_QUERY: &str = "Malformed query string.";
const MALFORMED_BODY: &str = "Malformed request body.";

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Envelope shared by every response body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
	pub success: bool,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub data: Option<T>,
}

/// Query string of the listing and chartop routes.
///
/// `tags` may be repeated (`tags=1&tags=2`) or comma separated (`tags=1,2`), or both.
#[derive(Debug, Deserialize)]
pub struct TimeseriesParams {
	#[serde(default)]
	pub page_number: u32,
	#[serde(default = "default_page_size")]
	pub page_size: u32,
	pub order_by: i32,
	#[serde(default)]
	pub order_asc: bool,
	#[serde(default)]
	pub tags: Vec<String>,
	#[serde(default)]
	pub all_or_any_tags: AllOrAnyTags,
}
impl TimeseriesParams {
	pub fn into_request(self, api: &Api) -> Result<TimeseriesRequest, ApiError> {
		if self.page_number > api.max_page_number {
			return Err(ApiError::bad_request(format!(
				"page_number must be between 0 and {}.",
				api.max_page_number
			)));
		}
		if self.page_size == 0 || self.page_size > api.max_page_size {
			return Err(ApiError::bad_request(format!(
				"page_size must be between 1 and {}.",
				api.max_page_size
			)));
		}

		Ok(TimeseriesRequest {
			page_number: self.page_number,
			page_size: self.page_size,
			order_by: self.order_by,
			order_asc: self.order_asc,
			tags: parse_tags(&self.tags)?,
			all_or_any_tags: self.all_or_any_tags,
		})
	}
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	message: String,
	data: Option<Value>,
}
impl ApiError {
	pub fn bad_request(message: impl Into<String>) -> Self {
		Self { status: StatusCode::BAD_REQUEST, message: message.into(), data: None }
	}

	pub fn status(&self) -> StatusCode {
		self.status
	}
}
impl From<chartop_service::Error> for ApiError {
	fn from(err: chartop_service::Error) -> Self {
		let status =
			StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		// Upstream causes are logged where the operation wraps them.
		if status.is_server_error() {
			tracing::debug!(status = status.as_u16(), error = %err, "Request failed.");
		} else {
			tracing::warn!(status = status.as_u16(), error = %err, "Request rejected.");
		}

		Self { status, message: err.public_message().to_string(), data: err.data().cloned() }
	}
}
impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		tracing::warn!(error = %rejection, "Malformed query string.");

		Self::bad_request(MALFORMED_QUERY)
	}
}
impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		tracing::warn!(error = %rejection, "Malformed request body.");

		Self::bad_request(MALFORMED_BODY)
	}
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = ApiResponse { success: false, message: self.message, data: self.data };

		(self.status, Json(body)).into_response()
	}
}

pub fn router(state: AppState) -> Router {
	let cors = cors_layer(&state.service.cfg.api.allow_origins);

	Router::new()
		.route("/health", get(health))
		.route("/api/v1/timeseries", get(list_timeseries))
		.route("/api/v1/chartop", get(get_chartop))
		.route("/api/v1/visualization_vectors", post(get_visualization_vectors))
		.route("/api/v1/tags", get(get_tags))
		.route("/api/v1/metrics", get(get_metrics))
		.layer(cors)
		.with_state(state)
}

fn cors_layer(allow_origins: &[String]) -> CorsLayer {
	let mut origins = Vec::with_capacity(allow_origins.len());

	for origin in allow_origins {
		match HeaderValue::from_str(origin) {
			Ok(value) => origins.push(value),
			Err(err) => tracing::warn!(%origin, error = %err, "Ignoring invalid CORS origin."),
		}
	}

	CorsLayer::new()
		.allow_methods([Method::GET, Method::POST])
		.allow_headers([header::CONTENT_TYPE])
		.allow_origin(origins)
}

async fn health() -> StatusCode {
	StatusCode::OK
}

async fn list_timeseries(
	State(state): State<AppState>,
	params: Result<Query<TimeseriesParams>, QueryRejection>,
) -> ApiResult<TimeseriesPage> {
	let Query(params) = params?;
	let req = params.into_request(&state.service.cfg.api)?;
	let page = state.service.list_timeseries(req).await?;

	Ok(success("Successfully retrieved timeseries.", page))
}

async fn get_chartop(
	State(state): State<AppState>,
	params: Result<Query<TimeseriesParams>, QueryRejection>,
) -> ApiResult<ChartopPage> {
	let Query(params) = params?;
	let req = params.into_request(&state.service.cfg.api)?;
	let page = state.service.get_chartop(req).await?;

	Ok(success("Successfully retrieved timeseries.", page))
}

async fn get_visualization_vectors(
	State(state): State<AppState>,
	payload: Result<Json<VisualizationVectorsRequest>, JsonRejection>,
) -> ApiResult<VisualizationVectors> {
	let Json(payload) = payload?;
	let found = state.service.get_visualization_vectors(payload).await?;

	Ok(success("Successfully retrieved visualization vectors.", found))
}

async fn get_tags(State(state): State<AppState>) -> ApiResult<Vec<Tag>> {
	let tags = state.service.get_tags().await?;

	Ok(success("Successfully retrieved tags.", tags))
}

async fn get_metrics(State(state): State<AppState>) -> ApiResult<Vec<Metric>> {
	let metrics = state.service.get_metrics().await?;

	Ok(success("Successfully retrieved metrics.", metrics))
}

fn success<T>(message: &str, data: T) -> Json<ApiResponse<T>> {
	Json(ApiResponse { success: true, message: message.to_string(), data: Some(data) })
}

fn default_page_size() -> u32 {
	DEFAULT_PAGE_SIZE
}

/// Parses `["1, 2", "3"]` into tag uids. Blank input means no filter.
fn parse_tags(raw: &[String]) -> Result<Option<Vec<i32>>, ApiError> {
	let mut tags = Vec::new();

	for part in raw.iter().flat_map(|value| value.split(',')).map(str::trim) {
		if part.is_empty() {
			continue;
		}

		let tag = part.parse::<i32>().map_err(|_| {
			ApiError::bad_request("tags must be a comma separated list of integers.")
		})?;

		tags.push(tag);
	}

	Ok((!tags.is_empty()).then_some(tags))
}
