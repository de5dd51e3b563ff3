//! ==============================================================================
//! api.rs - http surface for devices, dashboards and observers
//! ==============================================================================
//!
//! routes:
//!     device side
//!     - POST  /register            onboard a bin (201 new, 200 known)
//!     - POST  /telemetry, /update  report bolt count
//!     - GET   /config/:device_id   poll for configuration
//!     - POST  /confirm             acknowledge staged configuration
//!     dashboard side
//!     - PATCH /config              edit part number / location / unit weight
//!     - GET   /bins, /bins/:id     current state
//!     - GET   /summary             fleet overview
//!     - GET   /events              server-sent events (initialBinData, updateBinData)
//!     - GET   /health
//!
//! every handler locks the SharedHub for the whole request, which is what
//! serializes mutations. malformed bodies are answered with 400
//! MALFORMED_REQUEST rather than axum's default rejection.
//!
//! ==============================================================================

use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, Path as UrlPath, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, patch, post},
    Json, Router,
};
use tokio_stream::{Stream, StreamExt};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::broadcast::BinEvent;
use crate::domain::{
    Bin, BinMap, ConfigRequest, ConfigView, ConfirmRequest, PendingConfig, RegisterRequest,
    Summary, TelemetryRequest,
};
use crate::error::{HubError, HubResult};
use crate::hub::SharedHub;

/// build the full router
///
/// when `static_dir` is given, unmatched paths are served from it so the
/// built dashboard can live next to the api.
pub fn router(hub: SharedHub, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/register", post(register_handler))
        .route("/telemetry", post(telemetry_handler))
        .route("/update", post(telemetry_handler))
        .route("/config", patch(config_handler))
        .route("/config/:device_id", get(config_poll_handler))
        .route("/confirm", post(confirm_handler))
        .route("/bins", get(bins_handler))
        .route("/bins/:device_id", get(bin_handler))
        .route("/summary", get(summary_handler))
        .route("/events", get(events_handler))
        .route("/health", get(|| async { "OK" }))
        .with_state(hub);

    let api = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api,
    };

    api.layer(CorsLayer::permissive()).layer(TraceLayer::new_for_http())
}

/// unwrap a json body, reporting any extraction failure as malformed
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> HubResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| HubError::MalformedRequest(rejection.body_text()))
}

// ==============================================================================
// device side
// ==============================================================================

async fn register_handler(
    State(hub): State<SharedHub>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> HubResult<(StatusCode, Json<Bin>)> {
    let req = body(payload)?;
    let (bin, created) = hub.lock().await.register(&req)?;
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((status, Json(bin)))
}

async fn telemetry_handler(
    State(hub): State<SharedHub>,
    payload: Result<Json<TelemetryRequest>, JsonRejection>,
) -> HubResult<Json<Bin>> {
    let req = body(payload)?;
    let bin = hub.lock().await.apply_telemetry(&req)?;
    Ok(Json(bin))
}

async fn config_poll_handler(
    State(hub): State<SharedHub>,
    UrlPath(device_id): UrlPath<String>,
) -> HubResult<Json<ConfigView>> {
    let view = hub.lock().await.config_for(&device_id)?;
    tracing::debug!("Sending config for {} (pending: {})", device_id, view.pending);
    Ok(Json(view))
}

async fn confirm_handler(
    State(hub): State<SharedHub>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> HubResult<Json<PendingConfig>> {
    let req = body(payload)?;
    if req.device_id.trim().is_empty() {
        return Err(HubError::MalformedRequest("deviceId is required".into()));
    }
    let confirmed = hub.lock().await.confirm(&req.device_id)?;
    Ok(Json(confirmed))
}

// ==============================================================================
// dashboard side
// ==============================================================================

async fn config_handler(
    State(hub): State<SharedHub>,
    payload: Result<Json<ConfigRequest>, JsonRejection>,
) -> HubResult<Json<Bin>> {
    let req = body(payload)?;
    let bin = hub.lock().await.apply_config(&req)?;
    Ok(Json(bin))
}

async fn bins_handler(State(hub): State<SharedHub>) -> Json<BinMap> {
    Json(hub.lock().await.snapshot())
}

async fn bin_handler(
    State(hub): State<SharedHub>,
    UrlPath(device_id): UrlPath<String>,
) -> HubResult<Json<Bin>> {
    Ok(Json(hub.lock().await.bin(&device_id)?))
}

async fn summary_handler(State(hub): State<SharedHub>) -> Json<Summary> {
    Json(hub.lock().await.summary())
}

async fn events_handler(
    State(hub): State<SharedHub>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscription = hub.lock().await.subscribe();
    Sse::new(subscription.into_stream().map(sse_event)).keep_alive(KeepAlive::default())
}

fn sse_event(event: BinEvent) -> Result<Event, axum::Error> {
    let payload = event.payload().map_err(axum::Error::new)?;
    Event::default().event(event.name()).json_data(payload)
}
