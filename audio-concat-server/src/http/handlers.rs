use crate::error::ServerError;
use crate::state::AppState;
use audio_concat::{ConcatError, ConcatReport, ConcatSession, Stage};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Error response for the concatenation API
#[derive(Debug)]
pub enum HttpError {
    InvalidRequest(String),
    Concat(ConcatError),
    InternalError(String),
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub stage: Option<Stage>,
    pub path: Option<PathBuf>,
}

impl HttpError {
    fn status(&self) -> StatusCode {
        match self {
            HttpError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            // Later segments are skipped, so these only surface for the first one.
            HttpError::Concat(
                ConcatError::OpenInput { .. }
                | ConcatError::NoAudioStream { .. }
                | ConcatError::NoUsableSegments { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            HttpError::Concat(_) | HttpError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            HttpError::InvalidRequest(m) | HttpError::InternalError(m) => ErrorBody {
                error: m.clone(),
                stage: None,
                path: None,
            },
            HttpError::Concat(e) => ErrorBody {
                error: e.to_string(),
                stage: Some(e.stage()),
                path: e.path().map(|p| p.to_path_buf()),
            },
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<ServerError> for HttpError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::PathOutsideRoot(_) => HttpError::InvalidRequest(err.to_string()),
            ServerError::Library(e) => HttpError::Concat(e),
            other => HttpError::InternalError(other.to_string()),
        }
    }
}

impl From<ConcatError> for HttpError {
    fn from(err: ConcatError) -> Self {
        HttpError::Concat(err)
    }
}

/// Body of `POST /concat`
#[derive(Debug, Deserialize)]
pub struct ConcatRequest {
    /// Segments in playback order
    pub inputs: Vec<PathBuf>,
    /// Output file; the extension picks the codec and container
    pub output: PathBuf,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Version information endpoint
pub async fn version_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": audio_concat::ffmpeg_version_info(),
        "idle_session_slots": state.idle_session_slots(),
    }))
}

/// Encoder capability report
pub async fn encoders(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "encoders": state.registry.encoders() }))
}

/// Run one concatenation session and return its report.
///
/// The session runs on the blocking pool once a session slot is free.
pub async fn concat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConcatRequest>,
) -> Result<Json<ConcatReport>, HttpError> {
    if request.output.as_os_str().is_empty() {
        return Err(HttpError::InvalidRequest("output path is empty".to_string()));
    }

    let inputs = request
        .inputs
        .iter()
        .map(|p| state.config.resolve(p))
        .collect::<Result<Vec<_>, _>>()?;
    let output = state.config.resolve(&request.output)?;

    let permit = Arc::clone(&state.sessions)
        .acquire_owned()
        .await
        .map_err(|e| HttpError::InternalError(e.to_string()))?;
    let registry = Arc::clone(&state.registry);

    tracing::info!(
        segments = inputs.len(),
        output = %output.display(),
        "concat request accepted"
    );

    let report = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        ConcatSession::new(inputs, output, &*registry).run()
    })
    .await
    .map_err(|e| HttpError::InternalError(format!("session task failed: {}", e)))??;

    Ok(Json(report))
}
