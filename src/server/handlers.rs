//! HTTP request handlers for the data gateway API.
//!
//! # Endpoints
//!
//! - `GET /healthz` - Health check
//! - `GET /text/instrument/{instrument}/experiment_number/{n}?filename=` - Serve a text file
//! - `GET /find_file/instrument/{instrument}/experiment_number/{n}?filename=` - Locate a file
//! - `GET /find_file/generic/experiment_number/{n}?filename=` - Locate a generic experiment file
//! - `GET /find_file/generic/user_number/{n}?filename=` - Locate a generic user file
//! - `GET /live-data/{instrument}/files` - List live-data files

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::LookupError;
use crate::fs::PathResolver;

// =============================================================================
// Application State
// =============================================================================

/// First line the health marker file must carry. Kept verbatim so
/// external probes that match on the text keep working.
pub const HEALTHY_MARKER: &str = "This is a healthy file! You have read it correctly!";

/// Root-relative location of the health marker file. Its presence
/// proves the data share is mounted and readable.
pub const HEALTHY_FILE_PATH: &str = "GENERIC/autoreduce/healthy_file.txt";

/// Shared application state for the file-serving handlers.
///
/// This is passed to all handlers via Axum's State extractor. The
/// authorization gate carries its own state and runs before any of
/// these handlers see a request.
#[derive(Clone)]
pub struct AppState {
    /// Resolver rooted at the data share
    pub resolver: Arc<PathResolver>,

    /// Production deployments read live data from `GENERIC`, others
    /// from `GENERIC-staging`
    pub production: bool,
}

impl AppState {
    /// Create a new application state around a resolver.
    pub fn new(resolver: PathResolver, production: bool) -> Self {
        Self {
            resolver: Arc::new(resolver),
            production,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for instrument-scoped file routes.
#[derive(Debug, Deserialize)]
pub struct InstrumentExperimentParams {
    /// Instrument name (case-insensitive, folded to the on-disk
    /// uppercase convention)
    pub instrument: String,

    /// Experiment (RB) number
    pub experiment_number: u32,
}

/// Path parameters for generic experiment-number routes.
#[derive(Debug, Deserialize)]
pub struct ExperimentParams {
    pub experiment_number: u32,
}

/// Path parameters for generic user-number routes.
#[derive(Debug, Deserialize)]
pub struct UserParams {
    pub user_number: u32,
}

/// Query parameters shared by every file route.
#[derive(Debug, Deserialize)]
pub struct FilenameParams {
    /// Exact filename to locate; path fragments are rejected
    pub filename: String,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "forbidden")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors from the file-serving handlers.
///
/// A file that cannot be located is a client error here, not a 404:
/// the route exists, the request named a file this deployment does not
/// have.
#[derive(Debug)]
pub enum FileRouteError {
    /// No file with the requested name under the searched tree
    NotFound { filename: String },

    /// No live-data directory for the named instrument
    UnknownInstrument { instrument: String },

    /// A client-supplied parameter is below its allowed minimum
    IntervalTooSmall { what: &'static str, minimum: u64 },

    /// Name validation or containment failure
    Lookup(LookupError),

    /// Failed to read a located file, or a worker task died
    Internal(String),
}

impl From<LookupError> for FileRouteError {
    fn from(err: LookupError) -> Self {
        FileRouteError::Lookup(err)
    }
}

impl IntoResponse for FileRouteError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            FileRouteError::NotFound { filename } => (
                StatusCode::BAD_REQUEST,
                "not_found",
                format!("File {filename} could not be found"),
            ),

            FileRouteError::UnknownInstrument { instrument } => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("No live data directory for instrument {instrument}"),
            ),

            FileRouteError::IntervalTooSmall { what, minimum } => (
                StatusCode::BAD_REQUEST,
                "invalid_interval",
                format!("{what} must be at least {minimum} second(s)"),
            ),

            FileRouteError::Lookup(LookupError::InvalidName { what, value }) => (
                StatusCode::FORBIDDEN,
                "forbidden_characters",
                format!("Invalid {what}: {value}"),
            ),

            FileRouteError::Lookup(LookupError::Sandbox(err)) => (
                StatusCode::FORBIDDEN,
                "forbidden",
                err.to_string(),
            ),

            FileRouteError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                message.clone(),
            ),
        };

        // Log errors based on severity
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if matches!(
            self,
            FileRouteError::NotFound { .. } | FileRouteError::UnknownInstrument { .. }
        ) {
            // Missing files are common and expected
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "File not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /healthz`
///
/// Always open; used by liveness probes. Healthy means the marker file
/// on the data share exists and carries the expected first line, which
/// proves the mount is up and readable end to end.
///
/// # Response
///
/// - `200 OK` with body `ok`
/// - `503 Service Unavailable` when the marker is missing or wrong
pub async fn healthz_handler(State(state): State<AppState>) -> Response {
    let marker = state.resolver.root().join(HEALTHY_FILE_PATH);
    let healthy = match tokio::fs::read_to_string(&marker).await {
        Ok(contents) => contents.lines().next() == Some(HEALTHY_MARKER),
        Err(err) => {
            warn!(path = %marker.display(), "health marker unreadable: {err}");
            false
        }
    };

    if healthy {
        (StatusCode::OK, "ok").into_response()
    } else {
        let error_response = ErrorResponse::with_status(
            "unhealthy",
            "Data share health marker is missing or invalid",
            StatusCode::SERVICE_UNAVAILABLE,
        );
        (StatusCode::SERVICE_UNAVAILABLE, Json(error_response)).into_response()
    }
}

/// Serve the contents of a text file for an instrument experiment.
///
/// # Endpoint
///
/// `GET /text/instrument/{instrument}/experiment_number/{n}?filename={filename}`
///
/// # Response
///
/// - `200 OK`: the file contents as `text/plain`
/// - `400 Bad Request`: no such file under the experiment's tree
/// - `403 Forbidden`: filename or instrument contains forbidden characters
pub async fn text_file_handler(
    State(state): State<AppState>,
    Path(params): Path<InstrumentExperimentParams>,
    Query(query): Query<FilenameParams>,
) -> Result<Response, FileRouteError> {
    let filename = query.filename.clone();
    let path = resolve_blocking(Arc::clone(&state.resolver), move |resolver| {
        resolver.find_instrument_file(&params.instrument, params.experiment_number, &query.filename)
    })
    .await?
    .ok_or(FileRouteError::NotFound { filename })?;

    let contents = tokio::fs::read_to_string(&path)
        .await
        .map_err(|err| FileRouteError::Internal(format!("failed to read {}: {err}", path.display())))?;

    let response = (
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        contents,
    )
        .into_response();
    Ok(response)
}

/// Locate a file for an instrument experiment.
///
/// # Endpoint
///
/// `GET /find_file/instrument/{instrument}/experiment_number/{n}?filename={filename}`
///
/// # Response
///
/// `200 OK` with the file's path relative to the data root, as a JSON
/// string.
pub async fn find_instrument_file_handler(
    State(state): State<AppState>,
    Path(params): Path<InstrumentExperimentParams>,
    Query(query): Query<FilenameParams>,
) -> Result<Json<String>, FileRouteError> {
    let filename = query.filename.clone();
    let found = resolve_blocking(Arc::clone(&state.resolver), move |resolver| {
        resolver.find_instrument_file(&params.instrument, params.experiment_number, &query.filename)
    })
    .await?;
    relative_response(&state, found, filename)
}

/// Locate a file under the generic experiment-number tree.
///
/// # Endpoint
///
/// `GET /find_file/generic/experiment_number/{n}?filename={filename}`
pub async fn find_experiment_file_handler(
    State(state): State<AppState>,
    Path(params): Path<ExperimentParams>,
    Query(query): Query<FilenameParams>,
) -> Result<Json<String>, FileRouteError> {
    let filename = query.filename.clone();
    let found = resolve_blocking(Arc::clone(&state.resolver), move |resolver| {
        resolver.find_experiment_file(params.experiment_number, &query.filename)
    })
    .await?;
    relative_response(&state, found, filename)
}

/// Locate a file under the generic user-number tree.
///
/// # Endpoint
///
/// `GET /find_file/generic/user_number/{n}?filename={filename}`
pub async fn find_user_file_handler(
    State(state): State<AppState>,
    Path(params): Path<UserParams>,
    Query(query): Query<FilenameParams>,
) -> Result<Json<String>, FileRouteError> {
    let filename = query.filename.clone();
    let found = resolve_blocking(Arc::clone(&state.resolver), move |resolver| {
        resolver.find_user_file(params.user_number, &query.filename)
    })
    .await?;
    relative_response(&state, found, filename)
}

/// List the files currently present in an instrument's live-data
/// directory.
///
/// # Endpoint
///
/// `GET /live-data/{instrument}/files`
///
/// # Response
///
/// `200 OK` with a sorted JSON array of filenames. An instrument with
/// no live-data directory yields `404 Not Found`.
pub async fn live_data_files_handler(
    State(state): State<AppState>,
    Path(instrument): Path<String>,
) -> Result<Json<Vec<String>>, FileRouteError> {
    let production = state.production;
    let name = instrument.clone();
    let dir = resolve_blocking(Arc::clone(&state.resolver), move |resolver| {
        resolver.live_data_dir(&name, production)
    })
    .await?
    .ok_or(FileRouteError::UnknownInstrument { instrument })?;

    let files = tokio::task::spawn_blocking(move || list_files(&dir))
        .await
        .map_err(|err| FileRouteError::Internal(err.to_string()))?
        .map_err(|err| FileRouteError::Internal(err.to_string()))?;
    Ok(Json(files))
}

// =============================================================================
// Helpers
// =============================================================================

/// Run a resolver lookup on the blocking pool. The resolver walks
/// directory trees synchronously; keeping that off the async workers
/// stops a slow network share from stalling unrelated requests.
async fn resolve_blocking<F>(
    resolver: Arc<PathResolver>,
    lookup: F,
) -> Result<Option<PathBuf>, FileRouteError>
where
    F: FnOnce(&PathResolver) -> Result<Option<PathBuf>, LookupError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || lookup(&resolver))
        .await
        .map_err(|err| FileRouteError::Internal(err.to_string()))?
        .map_err(FileRouteError::from)
}

fn relative_response(
    state: &AppState,
    found: Option<PathBuf>,
    filename: String,
) -> Result<Json<String>, FileRouteError> {
    let path = found.ok_or(FileRouteError::NotFound { filename })?;
    let relative = state
        .resolver
        .guard()
        .relative(&path)
        .map_err(LookupError::from)?;
    Ok(Json(relative.to_string_lossy().into_owned()))
}

fn list_files(dir: &std::path::Path) -> std::io::Result<Vec<String>> {
    let mut files: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    files.sort();
    Ok(files)
}
