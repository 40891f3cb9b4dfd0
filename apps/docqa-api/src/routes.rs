use std::convert::Infallible;

use axum::{
	Json, Router,
	extract::{
		DefaultBodyLimit, FromRequest, Multipart, Path, Request, State,
		multipart::MultipartError,
	},
	http::{StatusCode, header::CONTENT_TYPE},
	response::{
		IntoResponse, Response,
		sse::{Event, KeepAlive, Sse},
	},
	routing::{delete, get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use docqa_service::{
	AnswerEvent, CreateSessionResponse, DocumentSummary, Error as ServiceError, IngestRequest,
	IngestResponse, IngestSource, QueryRequest, RefreshResponse, ServiceHealth, SessionHealth,
	SessionStatus,
};

// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

pub fn router(state: AppState) -> Router {
	let body_limit = state.service.cfg.ingest.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
	let cors_allow_any = state.service.cfg.service.cors_allow_any;
	let router = Router::new()
		.route("/health", get(health))
		.route("/v1/sessions", post(create_session))
		.route("/v1/sessions/{session_id}", delete(delete_session))
		.route("/v1/sessions/{session_id}/status", get(session_status))
		.route("/v1/sessions/{session_id}/refresh", post(refresh_session))
		.route("/v1/sessions/{session_id}/health", get(session_health))
		.route("/v1/sessions/{session_id}/documents", post(ingest_document).get(list_documents))
		.route("/v1/sessions/{session_id}/documents/{doc_id}", delete(delete_document))
		.route("/v1/sessions/{session_id}/query", post(query))
		.layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX)))
		.with_state(state);

	if cors_allow_any { router.layer(CorsLayer::permissive()) } else { router }
}

async fn health(State(state): State<AppState>) -> Json<ServiceHealth> {
	Json(state.service.service_health())
}

async fn create_session(State(state): State<AppState>) -> Json<CreateSessionResponse> {
	Json(state.service.create_session())
}

async fn delete_session(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_session(&session_id)?;

	Ok(StatusCode::NO_CONTENT)
}

async fn session_status(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Json<SessionStatus> {
	Json(state.service.status(&session_id, OffsetDateTime::now_utc()))
}

async fn refresh_session(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<Json<RefreshResponse>, ApiError> {
	Ok(Json(state.service.refresh(&session_id)?))
}

async fn session_health(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<Json<SessionHealth>, ApiError> {
	Ok(Json(state.service.health(&session_id, OffsetDateTime::now_utc())?))
}

#[derive(Debug, Deserialize)]
struct UrlBody {
	url: Option<String>,
}

/// Accepts a multipart upload with a `file` field, or a JSON body with a `url`.
async fn ingest_document(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
	request: Request,
) -> Result<Json<IngestResponse>, ApiError> {
	let is_multipart = request
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|value| value.to_str().ok())
		.is_some_and(|value| value.starts_with("multipart/form-data"));
	let source = if is_multipart {
		let multipart = Multipart::from_request(request, &state)
			.await
			.map_err(|err| invalid_request(err.body_text()))?;

		read_upload(multipart).await?
	} else {
		let Json(body) = Json::<UrlBody>::from_request(request, &state)
			.await
			.map_err(|err| invalid_request(err.body_text()))?;
		let url = body
			.url
			.ok_or_else(|| invalid_request("Provide a multipart file upload or a JSON url."))?;

		IngestSource::Url { url }
	};
	let response = state.service.ingest(IngestRequest { session_id, source }).await?;

	Ok(Json(response))
}

async fn read_upload(mut multipart: Multipart) -> Result<IngestSource, ApiError> {
	while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
		if field.name() != Some("file") {
			continue;
		}

		let filename = field.file_name().unwrap_or_default().to_string();
		let bytes = field.bytes().await.map_err(multipart_error)?;

		return Ok(IngestSource::Upload { filename, bytes: bytes.to_vec() });
	}

	Err(invalid_request("Multipart body must include a file field."))
}

async fn list_documents(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
) -> Result<Json<Vec<DocumentSummary>>, ApiError> {
	Ok(Json(state.service.list_documents(&session_id).await?))
}

async fn delete_document(
	State(state): State<AppState>,
	Path((session_id, doc_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
	state.service.delete_document(&session_id, &doc_id).await?;

	Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct QueryBody {
	q: String,
	doc_ids: Option<Vec<String>>,
	#[serde(default)]
	stream: bool,
}

async fn query(
	State(state): State<AppState>,
	Path(session_id): Path<String>,
	Json(body): Json<QueryBody>,
) -> Result<Response, ApiError> {
	let req = QueryRequest { session_id, question: body.q, doc_ids: body.doc_ids };

	if !body.stream {
		return Ok(Json(state.service.query(req).await?).into_response());
	}

	let events = state.service.query_stream(req).await?;
	let stream = events.map(|event| Ok::<_, Infallible>(sse_event(event)));

	Ok(Sse::new(stream).keep_alive(KeepAlive::default()).into_response())
}

fn sse_event(event: AnswerEvent) -> Event {
	let base = Event::default().event(event.name());
	let data = match event {
		AnswerEvent::Sources(sources) => serde_json::to_string(&sources),
		AnswerEvent::Token(token) => serde_json::to_string(&token),
		AnswerEvent::Error { message } =>
			serde_json::to_string(&serde_json::json!({ "message": message })),
		AnswerEvent::End => return base.data(""),
	};

	match data {
		Ok(data) => base.data(data),
		Err(err) => {
			tracing::error!(error = %err, "Failed to encode stream event.");

			base.data("null")
		},
	}
}

#[derive(Debug, Serialize)]
struct ErrorBody {
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	error_code: String,
	message: String,
	fields: Option<Vec<String>>,
}
impl ApiError {
	fn new(
		status: StatusCode,
		error_code: impl Into<String>,
		message: impl Into<String>,
		fields: Option<Vec<String>>,
	) -> Self {
		Self { status, error_code: error_code.into(), message: message.into(), fields }
	}
}

impl From<ServiceError> for ApiError {
	fn from(err: ServiceError) -> Self {
		match err {
			ServiceError::NotFound { message } =>
				json_error(StatusCode::NOT_FOUND, "NOT_FOUND", message, None),
			ServiceError::Gone { message } => json_error(StatusCode::GONE, "GONE", message, None),
			ServiceError::InvalidInput { message } =>
				json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None),
			ServiceError::PayloadTooLarge { message } =>
				json_error(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message, None),
			ServiceError::Upstream { message } => {
				tracing::error!(error = %message, "Upstream failure.");

				json_error(StatusCode::INTERNAL_SERVER_ERROR, "UPSTREAM_FAILURE", message, None)
			},
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body =
			ErrorBody { error_code: self.error_code, message: self.message, fields: self.fields };

		(self.status, Json(body)).into_response()
	}
}

pub fn json_error(
	status: StatusCode,
	code: &str,
	message: impl Into<String>,
	fields: Option<Vec<String>>,
) -> ApiError {
	ApiError::new(status, code, message, fields)
}

fn invalid_request(message: impl Into<String>) -> ApiError {
	json_error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", message, None)
}

fn multipart_error(err: MultipartError) -> ApiError {
	if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
		return json_error(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", err.body_text(), None);
	}

	invalid_request(err.body_text())
}
