// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::json;
use std::sync::Arc;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::dialogue_engine::{DialogueEngine, DialogueError};
use crate::application::store_lifecycle::{
    CreateStoreError, ListStoresError, StoreLifecycleService,
};
use crate::application::verification_service::VerificationQuorumService;
use crate::domain::dialogue::{IntentExtractionError, SessionId};
use crate::domain::repository::RepositoryError;
use crate::domain::store::{DuplicatePolicy, StoreId, StoreStatus, UserId};
use crate::domain::submission::{FieldViolation, StoreSubmission};
use crate::domain::verification::{Decision, VerificationError};
use crate::infrastructure::event_bus::EventBus;

/// Callers are already authenticated upstream; this header carries the
/// resolved principal id. Requests without it are rejected with 401.
const PRINCIPAL_HEADER: &str = "x-principal-id";

pub struct AppState {
    pub lifecycle: Arc<StoreLifecycleService>,
    pub verification: Arc<VerificationQuorumService>,
    pub dialogue: Arc<DialogueEngine>,
    pub event_bus: EventBus,
}

pub fn app(
    lifecycle: Arc<StoreLifecycleService>,
    verification: Arc<VerificationQuorumService>,
    dialogue: Arc<DialogueEngine>,
    event_bus: EventBus,
) -> Router {
    let state = Arc::new(AppState {
        lifecycle,
        verification,
        dialogue,
        event_bus,
    });

    Router::new()
        .route("/submissions", post(create_submission))
        .route("/dialogue/{session_id}/message", post(dialogue_message))
        .route("/stores", get(list_stores))
        .route("/stores/owner/{owner_id}", get(list_by_owner))
        .route("/stores/{id}/verify", post(submit_verification))
        .route("/events/stream", get(stream_events))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn principal(headers: &HeaderMap) -> Result<UserId, ApiError> {
    headers
        .get(PRINCIPAL_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(UserId::new)
        .ok_or(ApiError::MissingPrincipal)
}

#[derive(serde::Deserialize)]
pub struct CreateSubmissionRequest {
    #[serde(flatten)]
    payload: StoreSubmission,
    #[serde(default)]
    create_anyway: bool,
}

async fn create_submission(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<Response, ApiError> {
    let owner = principal(&headers)?;
    let policy = if request.create_anyway {
        DuplicatePolicy::CreateAnyway
    } else {
        DuplicatePolicy::Reject
    };

    let store = state.lifecycle.create(owner, &request.payload, policy).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "store_id": store.id, "status": store.status })),
    )
        .into_response())
}

#[derive(serde::Deserialize)]
pub struct DialogueMessageRequest {
    utterance: String,
}

async fn dialogue_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DialogueMessageRequest>,
) -> Result<Response, ApiError> {
    let user = principal(&headers)?;
    let response = state
        .dialogue
        .handle_message(SessionId::new(session_id), user, &request.utterance)
        .await?;
    Ok(Json(response).into_response())
}

#[derive(serde::Deserialize)]
pub struct ListStoresQuery {
    status: Option<String>,
    cursor: Option<String>,
    limit: Option<usize>,
}

async fn list_stores(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListStoresQuery>,
) -> Result<Response, ApiError> {
    let requester = principal(&headers)?;
    let status: StoreStatus = query
        .status
        .as_deref()
        .unwrap_or("unverified")
        .parse()
        .map_err(ApiError::BadRequest)?;

    let page = state
        .lifecycle
        .list_by_status(status, &requester, query.cursor.as_deref(), query.limit)
        .await?;
    Ok(Json(json!({ "items": page.items, "next_cursor": page.next_cursor })).into_response())
}

async fn list_by_owner(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    principal(&headers)?;
    let stores = state.lifecycle.list_by_owner(&UserId::new(owner_id)).await?;
    Ok(Json(json!({ "items": stores })).into_response())
}

#[derive(serde::Deserialize)]
pub struct VerifyRequest {
    decision: Decision,
    evidence: Option<String>,
}

async fn submit_verification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(request): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    let voter = principal(&headers)?;
    let outcome = state
        .verification
        .submit(
            StoreId::from_uuid(id),
            &voter,
            request.decision,
            request.evidence,
        )
        .await?;
    Ok(Json(json!({
        "status": outcome.status(),
        "verify_count": outcome.verify_count(),
    }))
    .into_response())
}

/// Domain-event stream for the external notification dispatcher.
async fn stream_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    principal(&headers)?;
    let receiver = state.event_bus.subscribe().into_inner();
    let stream = BroadcastStream::new(receiver).filter_map(|event| match event {
        Ok(event) => Some(Ok(
            Event::default().data(serde_json::to_string(&event).unwrap_or_default())
        )),
        // A lagged receiver skips dropped events rather than closing.
        Err(_) => None,
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug)]
pub enum ApiError {
    MissingPrincipal,
    BadRequest(String),
    NotFound(String),
    SelfVerificationForbidden,
    Duplicate { existing_store_id: StoreId },
    Validation(Vec<FieldViolation>),
    ExtractionUnavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingPrincipal => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": format!("missing {} header", PRINCIPAL_HEADER) }),
            ),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, json!({ "error": what })),
            ApiError::SelfVerificationForbidden => (
                StatusCode::FORBIDDEN,
                json!({ "error": "a store cannot be verified by its creator" }),
            ),
            ApiError::Duplicate { existing_store_id } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "a matching listing already exists",
                    "existing_store_id": existing_store_id,
                }),
            ),
            ApiError::Validation(violations) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": "submission failed validation", "violations": violations }),
            ),
            ApiError::ExtractionUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, json!({ "error": message }))
            }
            ApiError::Internal(message) => {
                tracing::error!(%message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<CreateStoreError> for ApiError {
    fn from(err: CreateStoreError) -> Self {
        match err {
            CreateStoreError::Invalid(violations) => ApiError::Validation(violations),
            CreateStoreError::Duplicate { existing_store_id } => {
                ApiError::Duplicate { existing_store_id }
            }
            CreateStoreError::Storage(err) => err.into(),
        }
    }
}

impl From<ListStoresError> for ApiError {
    fn from(err: ListStoresError) -> Self {
        match err {
            ListStoresError::InvalidCursor => ApiError::BadRequest("invalid cursor".to_string()),
            ListStoresError::Storage(err) => err.into(),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::NotFound(store_id) => {
                ApiError::NotFound(format!("store {} not found", store_id))
            }
            VerificationError::SelfVerificationForbidden => ApiError::SelfVerificationForbidden,
            VerificationError::Storage(err) => err.into(),
        }
    }
}

impl From<DialogueError> for ApiError {
    fn from(err: DialogueError) -> Self {
        match err {
            DialogueError::Extraction(IntentExtractionError::Unavailable(message)) => {
                ApiError::ExtractionUnavailable(message)
            }
            DialogueError::Extraction(err) => ApiError::Internal(err.to_string()),
            DialogueError::Storage(err) => err.into(),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
