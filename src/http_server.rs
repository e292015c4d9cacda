use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post, put},
    Router,
};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use anyhow::{anyhow, Result};
use log::{info, error, warn, debug};
use uuid::Uuid;

use crate::config::Config;
use crate::data_url::UploadedImage;
use crate::editor::{SessionHandle, SubmitOutcome};
use crate::error::EditError;
use crate::image_gen::{GeminiClient, ImageProvider};
use crate::prompts::{AspectPreference, EditMode, PRESETS};
use crate::session::Rejected;

/// Phone photos routinely exceed axum's 2 MB default.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn ImageProvider>,
    pub sessions: Arc<DashMap<Uuid, SessionHandle>>,
}

impl AppState {
    pub fn new(provider: Arc<dyn ImageProvider>) -> Self {
        AppState {
            provider,
            sessions: Arc::new(DashMap::new()),
        }
    }

    fn session(&self, id: Uuid) -> Result<SessionHandle, ApiError> {
        self.sessions
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(ApiError::NotFound(id))
    }
}

#[derive(Deserialize)]
pub struct EditPayload {
    pub instruction: Option<String>,
    pub mode: Option<EditMode>,
    pub aspect: Option<AspectPreference>,
    pub preset: Option<String>,
}

#[derive(Deserialize)]
pub struct AspectPayload {
    pub aspect: AspectPreference,
}

#[derive(Deserialize)]
pub struct DraftPayload {
    pub mode: EditMode,
    pub text: String,
}

pub enum ApiError {
    NotFound(Uuid),
    UnknownPreset(String),
    Rejected(Rejected),
    Edit(EditError),
}

impl From<EditError> for ApiError {
    fn from(e: EditError) -> Self {
        ApiError::Edit(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (StatusCode::NOT_FOUND, format!("No session with id {}", id)),
            ApiError::UnknownPreset(id) => (StatusCode::BAD_REQUEST, format!("Unknown preset '{}'", id)),
            ApiError::Rejected(Rejected::EmptyInstruction) => {
                (StatusCode::BAD_REQUEST, "Instruction must not be empty".to_string())
            }
            ApiError::Rejected(Rejected::Pending) => {
                (StatusCode::CONFLICT, "A generation is already in progress for this session".to_string())
            }
            ApiError::Edit(e @ EditError::InvalidFileType(_)) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, e.to_string()),
            ApiError::Edit(e @ EditError::ReadError(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Edit(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/presets", get(list_presets))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(delete_session))
        .route("/sessions/:id/image", put(change_image))
        .route("/sessions/:id/edits", post(submit_edit))
        .route("/sessions/:id/prev", post(navigate_prev))
        .route("/sessions/:id/next", post(navigate_next))
        .route("/sessions/:id/aspect", put(set_aspect))
        .route("/sessions/:id/drafts", put(set_draft))
        .route("/sessions/:id/download", get(download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Image editing server is running",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn list_presets() -> Json<Value> {
    Json(json!({ "presets": PRESETS }))
}

/// Builds an upload from a raw request body. The declared `Content-Type` is
/// checked before the bytes are looked at.
fn upload_from_request(headers: &HeaderMap, body: &Bytes) -> Result<UploadedImage, EditError> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .unwrap_or_default();
    let file_name = headers
        .get("x-file-name")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("upload")
        .to_string();

    if body.is_empty() {
        crate::data_url::validate_image_type(&mime_type)?;
        return Err(EditError::ReadError("empty upload".to_string()));
    }
    UploadedImage::from_bytes(file_name, &mime_type, body)
}

async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let image = upload_from_request(&headers, &body).map_err(|e| {
        warn!("Rejected upload: {}", e);
        ApiError::Edit(e)
    })?;

    let id = Uuid::new_v4();
    info!("📥 New session {} | {} | {} bytes", id, image.mime_type, body.len());
    let handle = SessionHandle::new(image, state.provider.clone());
    let view = handle.snapshot().await;
    state.sessions.insert(id, handle);

    Ok((StatusCode::CREATED, Json(json!({ "id": id, "session": view }))))
}

async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn delete_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    state.sessions.remove(&id).ok_or(ApiError::NotFound(id))?;
    info!("🗑️ Session {} discarded", id);
    Ok(StatusCode::NO_CONTENT)
}

async fn change_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    let image = upload_from_request(&headers, &body)?;
    info!("🔄 Session {} | New source image {} ({} bytes)", id, image.mime_type, body.len());
    handle.change_image(image).await;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn submit_edit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditPayload>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;

    let outcome = match payload.preset {
        Some(preset_id) => {
            debug!("Session {} | Preset '{}'", id, preset_id);
            match handle.submit_preset(&preset_id, payload.aspect).await {
                Some(outcome) => outcome,
                None => return Err(ApiError::UnknownPreset(preset_id)),
            }
        }
        None => {
            let instruction = payload.instruction.unwrap_or_default();
            let mode = payload.mode.unwrap_or(EditMode::DirectEdit);
            handle.submit_with_aspect(&instruction, mode, payload.aspect).await
        }
    };

    match outcome {
        SubmitOutcome::Rejected(rejected) => {
            warn!("Session {} | Submission rejected: {:?}", id, rejected);
            Err(ApiError::Rejected(rejected))
        }
        SubmitOutcome::Completed(completion) => {
            info!("✅ Session {} | {:?}", id, completion);
            Ok(Json(json!({
                "id": id,
                "result": completion,
                "session": handle.snapshot().await
            })))
        }
    }
}

async fn navigate_prev(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    handle.prev().await;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn navigate_next(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    handle.next().await;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn set_aspect(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AspectPayload>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    handle.set_aspect(payload.aspect).await;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn set_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DraftPayload>,
) -> Result<Json<Value>, ApiError> {
    let handle = state.session(id)?;
    handle.set_draft(payload.mode, payload.text).await;
    Ok(Json(json!({ "id": id, "session": handle.snapshot().await })))
}

async fn download(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Response, ApiError> {
    let handle = state.session(id)?;
    let download = handle.download().await?;
    debug!("Session {} | Download {} ({} bytes)", id, download.file_name, download.bytes.len());

    Ok((
        [
            (header::CONTENT_TYPE, download.mime_type),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{}\"", download.file_name)),
        ],
        download.bytes,
    )
        .into_response())
}

pub async fn start_http_server(config: Config) -> Result<()> {
    let client = GeminiClient::from_config(&config)
        .map_err(|e| anyhow!("Failed to build Gemini client: {}", e))?;
    info!("🎨 Using model {}", client.model());

    let app = create_router(AppState::new(Arc::new(client)));
    let port = config.http_port;

    let listener = tokio::net::TcpListener::bind(&format!("0.0.0.0:{}", port))
        .await
        .map_err(|e| anyhow!("Failed to bind to port {}: {}", port, e))?;

    info!("HTTP server starting on port {}", port);
    info!("Sessions endpoint: http://0.0.0.0:{}/sessions", port);

    axum::serve(listener, app)
        .await
        .map_err(|e| {
            error!("❌ HTTP server error: {}", e);
            anyhow!("HTTP server error: {}", e)
        })?;

    Ok(())
}
