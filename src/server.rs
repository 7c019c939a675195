//! Web server for the calibration UI and API

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use parking_lot::RwLock;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::automation::WindowAutomation;
use crate::config::{Config, GridSpec};
use crate::controller::{CommandOutcome, SessionHandle, SessionSnapshot};
use crate::error::{CalibrationError, CalibrationResult};
use crate::grid_pass::{self, ClickPlan, GridPassOutcome};
use crate::records::FinalOffsetRecord;
use crate::scale::DisplaySize;
use crate::session::SessionCommand;
use crate::store::{CalibrationFiles, ScreenshotEntry, ScreenshotStore};

/// Embedded static files for the web UI
#[derive(RustEmbed)]
#[folder = "static/"]
struct StaticAssets;

/// Shared application state
pub struct AppState {
    config: Config,
    automation: Arc<dyn WindowAutomation>,
    screenshots: ScreenshotStore,
    files: CalibrationFiles,
    session: SessionHandle,
    /// Human-readable line describing the last action
    status: RwLock<String>,
}

impl AppState {
    pub fn new(config: Config, automation: Arc<dyn WindowAutomation>) -> Self {
        let files = CalibrationFiles::from_config(&config.storage);
        Self {
            screenshots: ScreenshotStore::new(config.storage.screenshot_dir.clone()),
            session: SessionHandle::spawn(files.clone()),
            files,
            automation,
            config,
            status: RwLock::new("Ready".to_string()),
        }
    }

    fn set_status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        *self.status.write() = message;
    }

    /// Record a failure in the status line and turn it into a response
    fn fail(&self, action: &str, err: CalibrationError) -> ApiError {
        warn!("{} failed: {}", action, err);
        *self.status.write() = format!("{action} error ({}): {err}", err.kind());
        ApiError(err)
    }
}

/// Run blocking automation or file work off the async runtime
async fn blocking<T, F>(work: F) -> CalibrationResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CalibrationResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| CalibrationError::Automation(format!("worker task failed: {e}")))?
}

/// Error body returned by every failing endpoint
#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

struct ApiError(CalibrationError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CalibrationError::Automation(_) => StatusCode::BAD_GATEWAY,
            CalibrationError::NoCalibrationLoaded
            | CalibrationError::SessionInactive => StatusCode::CONFLICT,
            CalibrationError::InvalidWindowSize { .. }
            | CalibrationError::InvalidDisplaySize { .. }
            | CalibrationError::InvalidGrid(_)
            | CalibrationError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CalibrationError::Persistence(_) | CalibrationError::ControllerStopped => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = ErrorBody {
            kind: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Build the router; split out so tests can drive it without a socket
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Static files and UI
        .route("/", get(index_handler))
        .route("/static/*path", get(static_handler))
        // Screenshots
        .route("/api/status", get(get_status))
        .route("/api/screenshots", get(list_screenshots).post(take_screenshot))
        .route("/api/screenshots/:name", get(get_screenshot))
        .route("/api/focus", post(focus_screenshot))
        // Grid pass and offsets
        .route("/api/calibrate", post(run_calibration))
        .route("/api/offsets/load", post(load_offsets))
        .route("/api/calibrated", get(get_calibrated))
        // Manual session
        .route("/api/session", get(get_session))
        .route("/api/session/start", post(start_session))
        .route("/api/session/resize", post(resize_session))
        .route("/api/session/command", post(session_command))
        .route("/api/session/overlay", get(get_overlay))
        .route("/api/session/image", get(get_focused_image))
        // System info
        .route("/api/info", get(get_info))
        .layer(cors)
        .with_state(state)
}

/// Run the web server
pub async fn run_server(addr: &str, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Web server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Serve the main index page
async fn index_handler() -> impl IntoResponse {
    match StaticAssets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "Index not found").into_response(),
    }
}

/// Serve static files
async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    let path = path.trim_start_matches('/');

    match StaticAssets::get(path) {
        Some(content) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            (
                [(axum::http::header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}

#[derive(Serialize)]
struct StatusResponse {
    status: String,
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.status.read().clone(),
    })
}

/// Screenshots, newest first
async fn list_screenshots(State(state): State<Arc<AppState>>) -> ApiResult<Vec<ScreenshotEntry>> {
    let store = state.screenshots.clone();
    let shots = blocking(move || Ok(store.list()))
        .await
        .map_err(|e| state.fail("List screenshots", e))?;
    Ok(Json(shots))
}

/// Raw PNG bytes of one screenshot
async fn get_screenshot(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let store = state.screenshots.clone();
    let bytes = blocking(move || {
        let path = store.resolve(&name)?;
        read_image(&path)
    })
    .await
    .map_err(|e| state.fail("Load screenshot", e))?;

    Ok(([(axum::http::header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

fn read_image(path: &std::path::Path) -> CalibrationResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| CalibrationError::Image(format!("{}: {e}", path.display())))
}

#[derive(Serialize)]
struct ScreenshotResponse {
    path: PathBuf,
}

/// Capture the mirrored window into the screenshot store
async fn take_screenshot(State(state): State<Arc<AppState>>) -> ApiResult<ScreenshotResponse> {
    let automation = state.automation.clone();
    let store = state.screenshots.clone();
    let path = blocking(move || grid_pass::take_screenshot(automation.as_ref(), &store))
        .await
        .map_err(|e| state.fail("Screenshot", e))?;

    state.set_status(format!("Screenshot saved: {}", path.display()));
    Ok(Json(ScreenshotResponse { path }))
}

#[derive(Deserialize)]
struct FocusRequest {
    name: String,
}

#[derive(Serialize)]
struct FocusResponse {
    path: PathBuf,
    width: u32,
    height: u32,
}

/// Make a screenshot the displayed image
async fn focus_screenshot(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FocusRequest>,
) -> ApiResult<FocusResponse> {
    let path = state
        .screenshots
        .resolve(&req.name)
        .map_err(|e| state.fail("Focus", e))?;
    let size = state
        .session
        .focus(path.clone())
        .await
        .map_err(|e| state.fail("Focus", e))?;

    state.set_status(format!(
        "Focused: {}, size: {}x{}",
        path.display(),
        size.width,
        size.height
    ));
    Ok(Json(FocusResponse {
        path,
        width: size.width,
        height: size.height,
    }))
}

#[derive(Serialize)]
struct CalibrateResponse {
    grid: GridPassOutcome,
    session: SessionSnapshot,
}

/// Run the automated grid pass, load its results and start a session
async fn run_calibration(State(state): State<Arc<AppState>>) -> ApiResult<CalibrateResponse> {
    let automation = state.automation.clone();
    let spec = state.config.grid;
    let plan = ClickPlan::from(&state.config.automation);
    let files = state.files.clone();

    let outcome = blocking(move || grid_pass::run_grid_pass(automation.as_ref(), &spec, plan, &files))
        .await
        .map_err(|e| state.fail("Grid calibrate", e))?;

    state
        .session
        .load_record(outcome.record.clone())
        .await
        .map_err(|e| state.fail("Load offsets", e))?;
    state
        .session
        .focus(outcome.screenshot_file.clone())
        .await
        .map_err(|e| state.fail("Load grid screenshot", e))?;
    let session = state
        .session
        .start(None)
        .await
        .map_err(|e| state.fail("Start calibration", e))?;

    state.set_status(format!(
        "Grid calibrate done. Log={} PNG={}",
        outcome.log_file.display(),
        outcome.screenshot_file.display()
    ));
    Ok(Json(CalibrateResponse {
        grid: outcome,
        session,
    }))
}

#[derive(Serialize)]
struct LoadOffsetsResponse {
    window_width: u32,
    window_height: u32,
    cells: usize,
}

/// Load the last grid-pass log from disk
async fn load_offsets(State(state): State<Arc<AppState>>) -> ApiResult<LoadOffsetsResponse> {
    let files = state.files.clone();
    let record = blocking(move || files.read_offsets())
        .await
        .and_then(|record| record.validate().map(|_| record))
        .map_err(|e| state.fail("Load offsets", e))?;

    let response = LoadOffsetsResponse {
        window_width: record.window_width,
        window_height: record.window_height,
        cells: record.cells.len(),
    };
    state
        .session
        .load_record(record)
        .await
        .map_err(|e| state.fail("Load offsets", e))?;

    state.set_status(format!(
        "Loaded {} offsets for window {}x{}",
        response.cells, response.window_width, response.window_height
    ));
    Ok(Json(response))
}

/// Last committed table, if any
async fn get_calibrated(State(state): State<Arc<AppState>>) -> ApiResult<Option<FinalOffsetRecord>> {
    let files = state.files.clone();
    let record = blocking(move || Ok(files.read_calibrated()))
        .await
        .map_err(|e| state.fail("Read calibrated offsets", e))?;
    Ok(Json(record))
}

async fn get_session(State(state): State<Arc<AppState>>) -> ApiResult<SessionSnapshot> {
    let snapshot = state
        .session
        .snapshot()
        .await
        .map_err(|e| state.fail("Session", e))?;
    Ok(Json(snapshot))
}

/// Rendered size of the displayed image, as measured by the UI
#[derive(Deserialize, Default)]
struct DisplayRequest {
    width: Option<u32>,
    height: Option<u32>,
}

impl DisplayRequest {
    fn size(&self) -> Option<DisplaySize> {
        match (self.width, self.height) {
            (Some(width), Some(height)) => Some(DisplaySize::new(width, height)),
            _ => None,
        }
    }
}

async fn start_session(
    State(state): State<Arc<AppState>>,
    body: Option<Json<DisplayRequest>>,
) -> ApiResult<SessionSnapshot> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let snapshot = state
        .session
        .start(req.size())
        .await
        .map_err(|e| state.fail("Start calibration", e))?;

    state.set_status("WASD -> move, C -> commit, Q -> cancel");
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct ResizeRequest {
    width: u32,
    height: u32,
}

async fn resize_session(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResizeRequest>,
) -> ApiResult<SessionSnapshot> {
    let snapshot = state
        .session
        .resize(DisplaySize::new(req.width, req.height))
        .await
        .map_err(|e| state.fail("Resize", e))?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct CommandRequest {
    command: SessionCommand,
}

async fn session_command(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommandRequest>,
) -> ApiResult<CommandOutcome> {
    let outcome = state
        .session
        .command(req.command)
        .await
        .map_err(|e| state.fail("Calibration", e))?;

    match &outcome {
        CommandOutcome::Committed { path, .. } => {
            state.set_status(format!("Saved {}. Done!", path.display()))
        }
        CommandOutcome::Cancelled => state.set_status("Canceled calibration."),
        CommandOutcome::Moved { .. } => {}
    }
    Ok(Json(outcome))
}

/// Current overlay as PNG
async fn get_overlay(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let png = state
        .session
        .overlay()
        .await
        .map_err(|e| state.fail("Overlay", e))?;
    Ok(([(axum::http::header::CONTENT_TYPE, "image/png")], png).into_response())
}

/// Displayed image without markers
async fn get_focused_image(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let path = state
        .session
        .focused_path()
        .await
        .map_err(|e| state.fail("Load image", e))?;
    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let bytes = blocking(move || read_image(&path))
        .await
        .map_err(|e| state.fail("Load image", e))?;
    Ok(([(axum::http::header::CONTENT_TYPE, mime.to_string())], bytes).into_response())
}

/// System information response
#[derive(Serialize)]
struct InfoResponse {
    version: String,
    grid: GridSpec,
    process_name: String,
    screenshot_dir: PathBuf,
    offsets_file: PathBuf,
    calibrated_file: PathBuf,
}

async fn get_info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        grid: state.config.grid,
        process_name: state.config.automation.process_name.clone(),
        screenshot_dir: state.screenshots.dir().to_path_buf(),
        offsets_file: state.files.offsets.clone(),
        calibrated_file: state.files.calibrated.clone(),
    })
}
