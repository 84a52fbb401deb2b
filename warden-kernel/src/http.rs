//! REST API of the kernel
//!
//! Routes:
//! - `GET /health` (no key required)
//! - `GET /sites`, `POST /sites`
//! - `GET /sites/{id}` detail-view sections, `DELETE /sites/{id}`
//! - `POST /sites/{id}/snapshot` inbound snapshot
//! - `POST /sites/refresh` refresh a batch of sites
//! - `GET /modules/{name}`, `PUT /modules/{name}/release`
//! - `PUT /core/release`
//!
//! Every route except `/health` needs the `x-api-key` header to match the
//! configured key; without a configured key the API stays closed.

use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;

use crate::catalog::ModuleEntry;
use crate::errors::WardenError;
use crate::models::SiteRecord;
use crate::presentation::Section;
use crate::reconciler::ReconcileOutcome;
use crate::refresh::RefreshReport;
use crate::service::SiteService;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SiteService>,
    pub api_key: Option<Arc<str>>,
}

impl IntoResponse for WardenError {
    fn into_response(self) -> Response {
        let status = match &self {
            WardenError::MalformedSnapshot(_) => StatusCode::BAD_REQUEST,
            WardenError::SiteNotFound(_) | WardenError::ModuleNotFound(_) => StatusCode::NOT_FOUND,
            WardenError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    if req.uri().path().starts_with("/health") {
        return Ok(next.run(req).await);
    }

    let Some(expected) = app.api_key.as_deref() else {
        tracing::warn!("WARDEN_API_KEY not set - API access denied");
        return Err(StatusCode::UNAUTHORIZED);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/sites", get(list_sites).post(register_site))
        .route("/sites/refresh", post(refresh_sites))
        .route("/sites/{id}", get(show_site).delete(delete_site))
        .route("/sites/{id}/snapshot", post(receive_snapshot))
        .route("/modules/{name}", get(get_module))
        .route("/modules/{name}/release", put(record_module_release))
        .route("/core/release", put(publish_core_release))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

#[derive(Debug, Deserialize)]
struct RegisterSite {
    url: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    site_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Release {
    version: String,
    #[serde(default)]
    is_security: bool,
}

// GET /sites
async fn list_sites(State(app): State<AppState>) -> Result<Json<Vec<SiteRecord>>, WardenError> {
    Ok(Json(app.service.list_sites()?))
}

// POST /sites
async fn register_site(
    State(app): State<AppState>,
    Json(body): Json<RegisterSite>,
) -> Result<(StatusCode, Json<SiteRecord>), WardenError> {
    let site = app.service.register_site(&body.url)?;
    Ok((StatusCode::CREATED, Json(site)))
}

// GET /sites/{id}
async fn show_site(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Section>>, WardenError> {
    Ok(Json(app.service.show(&id)?))
}

// DELETE /sites/{id}
async fn delete_site(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ReconcileOutcome>, WardenError> {
    Ok(Json(app.service.delete_site(&id)?))
}

// POST /sites/{id}/snapshot
async fn receive_snapshot(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(raw): Json<serde_json::Value>,
) -> Result<Json<ReconcileOutcome>, WardenError> {
    Ok(Json(app.service.process_update(&id, &raw)?))
}

// POST /sites/refresh
async fn refresh_sites(State(app): State<AppState>, Json(body): Json<RefreshRequest>) -> Json<RefreshReport> {
    Json(app.service.refresh(&body.site_ids).await)
}

// GET /modules/{name}
async fn get_module(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ModuleEntry>, WardenError> {
    app.service
        .find_module(&name)?
        .map(Json)
        .ok_or(WardenError::ModuleNotFound(name))
}

// PUT /modules/{name}/release
async fn record_module_release(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(release): Json<Release>,
) -> Result<Json<serde_json::Value>, WardenError> {
    let changed = app
        .service
        .record_module_release(&name, &release.version, release.is_security)?;
    Ok(Json(serde_json::json!({ "changed": changed })))
}

// PUT /core/release
async fn publish_core_release(
    State(app): State<AppState>,
    Json(release): Json<Release>,
) -> Result<Json<serde_json::Value>, WardenError> {
    let updated = app
        .service
        .publish_core_release(&release.version, release.is_security)?;
    Ok(Json(serde_json::json!({ "sites_updated": updated })))
}
