//! JSON HTTP API for ingestion and room management.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/pipeline/data-ingest` | Submit documents for ingestion (202) |
//! | `GET`  | `/api/v1/pipeline/status/{submission_id}` | Poll an ingestion job |
//! | `POST` | `/api/v1/rooms/create-room` | Mint a join token with agent dispatch |
//! | `GET`  | `/api/v1/rooms/check/{room_name}` | Room existence and participants |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "No document names provided" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `queue_full` (503),
//! `dispatch_failed` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::ingest::{IngestContext, IngestService, IngestStatus, SubmitError};
use crate::rooms::{agent_name, RoomServiceClient, TokenIssuer};
use crate::store::VectorStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    ingest: Arc<IngestService>,
    issuer: Arc<TokenIssuer>,
    rooms: Arc<RoomServiceClient>,
}

/// Starts the API server. Binds to `[server].bind`, spins up the ingestion
/// worker pool, and serves until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let bind_addr = config.server.bind.clone();

    let pool = crate::store::connect(&config.store).await?;
    crate::migrate::run_migrations(&pool).await?;
    let store = VectorStore::new(pool);
    let embedder = crate::embedding::create_provider(&config.embedding)?;
    let chat = if config.ingest.enrichers {
        Some(Arc::new(crate::inference::ChatClient::new(
            &config.inference,
        )?))
    } else {
        None
    };

    let context = Arc::new(IngestContext {
        config: config.clone(),
        store,
        embedder,
        chat,
    });
    let ingest = IngestService::start(context);
    let issuer = Arc::new(TokenIssuer::from_env(&config.rooms)?);
    let rooms = Arc::new(RoomServiceClient::from_env(&config.rooms)?);

    let state = AppState {
        ingest,
        issuer,
        rooms,
    };
    let app = build_router(state);

    tracing::info!(%bind_addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/pipeline/data-ingest", post(handle_data_ingest))
        .route(
            "/api/v1/pipeline/status/{submission_id}",
            get(handle_ingest_status),
        )
        .route("/api/v1/rooms/create-room", post(handle_create_room))
        .route("/api/v1/rooms/check/{room_name}", get(handle_check_room))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`, `"not_found"`).
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn queue_full(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::SERVICE_UNAVAILABLE,
        code: "queue_full".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

// ============ Ingestion ============

#[derive(Deserialize)]
struct DataIngestRequest {
    user_id: String,
    project_id: String,
    project_name: String,
    /// Directory the named documents are read from.
    document_dir: String,
    document_names: Vec<String>,
    /// Replace the user's collection instead of appending.
    #[serde(default)]
    overwrite: bool,
}

#[derive(Serialize)]
struct DataIngestResponse {
    message: String,
    submission_id: String,
}

async fn handle_data_ingest(
    State(state): State<AppState>,
    Json(request): Json<DataIngestRequest>,
) -> Result<Response, AppError> {
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }

    let submission_id = state
        .ingest
        .submit(
            &request.user_id,
            &request.project_id,
            &request.project_name,
            PathBuf::from(request.document_dir),
            request.document_names,
            request.overwrite,
        )
        .map_err(submit_error_response)?;

    let body = DataIngestResponse {
        message: "Data ingestion started".to_string(),
        submission_id,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// An empty document list is the caller's fault; a full queue means try
/// again later; a dead worker pool is a server fault.
fn submit_error_response(e: SubmitError) -> AppError {
    match e {
        SubmitError::EmptyDocumentList => bad_request(e.to_string()),
        SubmitError::QueueFull => queue_full(e.to_string()),
        SubmitError::WorkersUnavailable => internal(e.to_string()),
    }
}

#[derive(Serialize)]
struct IngestStatusResponse {
    status: IngestStatus,
}

async fn handle_ingest_status(
    State(state): State<AppState>,
    Path(submission_id): Path<String>,
) -> Result<Json<IngestStatusResponse>, AppError> {
    match state.ingest.status(&submission_id) {
        Some(status) => Ok(Json(IngestStatusResponse { status })),
        None => Err(not_found(format!(
            "Unknown submission id: {}",
            submission_id
        ))),
    }
}

// ============ Rooms ============

#[derive(Deserialize)]
struct CreateRoomRequest {
    room_name: String,
    user_id: String,
    /// Override the dispatched agent name; defaults to `agent-<user_id>`.
    #[serde(default)]
    agent_name: Option<String>,
}

#[derive(Serialize)]
struct CreateRoomResponse {
    room: String,
    user_token: String,
    agent_name: String,
    agent_dispatched: bool,
}

async fn handle_create_room(
    State(state): State<AppState>,
    Json(request): Json<CreateRoomRequest>,
) -> Result<Json<CreateRoomResponse>, AppError> {
    if request.room_name.trim().is_empty() {
        return Err(bad_request("room_name must not be empty"));
    }
    if request.user_id.trim().is_empty() {
        return Err(bad_request("user_id must not be empty"));
    }

    let agent = request
        .agent_name
        .unwrap_or_else(|| agent_name(&request.user_id));
    let (dispatched, token) =
        state
            .issuer
            .mint_checked(&request.room_name, &request.user_id, Some(&agent));
    if !dispatched {
        return Err(internal("Failed to mint room token"));
    }

    Ok(Json(CreateRoomResponse {
        room: request.room_name,
        user_token: token,
        agent_name: agent,
        agent_dispatched: dispatched,
    }))
}

#[derive(Serialize)]
struct CheckRoomResponse {
    room_name: String,
    room_exists: bool,
    participants: Vec<String>,
}

async fn handle_check_room(
    State(state): State<AppState>,
    Path(room_name): Path<String>,
) -> Result<Json<CheckRoomResponse>, AppError> {
    let exists = state
        .rooms
        .room_exists(&room_name)
        .await
        .map_err(|e| internal(e.to_string()))?;

    let participants = if exists {
        state
            .rooms
            .list_participants(&room_name)
            .await
            .map_err(|e| internal(e.to_string()))?
    } else {
        Vec::new()
    };

    Ok(Json(CheckRoomResponse {
        room_name,
        room_exists: exists,
        participants,
    }))
}

// ============ Health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
