//! HTTP routing, authentication and latency middleware.

use crate::api::{Api, ConfigUpdate, NewUser, ParkRequest};
use crate::{Error, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Extension, Json, Router};
use policy::Principal;
use serde::Deserialize;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storage::{Config, StatusMap, User};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Options for mounting the API.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Prefix the API is mounted under; the endpoints live at `<base>/api`.
    pub base_path: String,
    /// Synthetic latency added to every authorized request.
    pub delay: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            base_path: "/".into(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Clone)]
struct AppState {
    api: Arc<Api>,
    delay: Duration,
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    key: Option<String>,
}

/// Path the API router is nested under for a given base path.
pub fn mount_path(base_path: &str) -> String {
    let base = base_path.trim_matches('/');
    if base.is_empty() {
        "/api".to_string()
    } else {
        format!("/{base}/api")
    }
}

/// Build the application router.
pub fn router(api: Arc<Api>, options: &RouterOptions) -> Router {
    let state = AppState {
        api,
        delay: options.delay,
    };

    // Layers run outermost-last: authentication first, then the delay.
    let api_routes = Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/{key}", delete(delete_user))
        .route("/config", get(get_config).post(set_config))
        .route("/status", get(get_status))
        .route("/park", post(record_park))
        .layer(middleware::from_fn_with_state(state.clone(), delay))
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .with_state(state);

    let mount = mount_path(&options.base_path);
    info!(%mount, "mounting API endpoints");

    Router::new()
        .nest(&mount, api_routes)
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await
}

async fn authenticate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let key = Query::<KeyQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(q)| q.key);
    let origin = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ConnectInfo(addr)| addr.ip().to_string());

    match state.api.authorize(key.as_deref(), &origin) {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn delay(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    next.run(request).await
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.api.list_users()?))
}

async fn create_user(
    State(state): State<AppState>,
    body: std::result::Result<Json<NewUser>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = body.map_err(|e| Error::Validation(e.body_text()))?;
    let user = state.api.create_user(request).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

async fn delete_user(State(state): State<AppState>, Path(key): Path<String>) -> Result<Json<Value>> {
    state.api.delete_user(&key).await?;
    Ok(Json(json!({ "success": true })))
}

async fn get_config(State(state): State<AppState>) -> Result<Json<Config>> {
    Ok(Json(state.api.get_config()?))
}

async fn set_config(
    State(state): State<AppState>,
    body: std::result::Result<Json<ConfigUpdate>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(update) = body.map_err(|e| Error::Validation(e.body_text()))?;
    let config = state.api.set_config(update).await?;
    Ok(Json(json!({ "success": true, "config": config })))
}

async fn get_status(State(state): State<AppState>) -> Result<Json<StatusMap>> {
    Ok(Json(state.api.get_status()?))
}

async fn record_park(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: std::result::Result<Json<ParkRequest>, JsonRejection>,
) -> Result<Json<Value>> {
    let Json(request) = body.map_err(|e| Error::Validation(e.body_text()))?;
    let status = state.api.record_park(&principal, request).await?;
    Ok(Json(json!({ "success": true, "status": status })))
}
