//! HTTP server.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use nestlink_core::config::schema::MAX_BODY_BYTES;
use nestlink_core::config::server as defaults;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::body::decode_request;
use crate::handler::{HandlerReply, SchemaHandler};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Seconds to wait for open requests on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

fn default_listen() -> String {
    defaults::DEFAULT_LISTEN.to_string()
}

fn default_shutdown_timeout() -> u64 {
    defaults::DEFAULT_SHUTDOWN_SECS
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Shared router state.
#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<SchemaHandler>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/nest", post(schema_handler))
        .route("/oauth", get(oauth_redirect_handler))
        .route("/api/health", get(health_handler))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn schema_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match decode_request(&headers, &body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(parent: state.handler.span(), error = %e, "Rejected request body");
            return crate::error::HandlerError::from(e).into_response();
        }
    };

    match state.handler.handle(request).await {
        Ok(HandlerReply::Response(response)) => Json(response).into_response(),
        Ok(HandlerReply::Empty) => StatusCode::OK.into_response(),
        Err(e) => e.into_response(),
    }
}

async fn oauth_redirect_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Response {
    let location =
        crate::redirect::authorization_url(&state.handler.config().project_id, query.as_deref());
    tracing::debug!(parent: state.handler.span(), location = %location, "Redirecting to partner connections");
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response()
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "nestlink",
        "version": nestlink_core::VERSION,
    }))
}

/// Serve `app` until `cancel` fires, then give open requests up to
/// `config.shutdown_timeout` seconds to finish.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(address = %listener.local_addr()?, "Listening");

    let shutdown = cancel.clone();
    let mut serving = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future(),
    );

    tokio::select! {
        result = &mut serving => {
            result??;
            return Ok(());
        }
        _ = cancel.cancelled() => {}
    }

    tracing::info!(timeout_secs = config.shutdown_timeout, "Shutting down HTTP server");
    match tokio::time::timeout(Duration::from_secs(config.shutdown_timeout), &mut serving).await {
        Ok(result) => result??,
        Err(_) => {
            tracing::warn!("Open requests did not finish in time, closing");
            serving.abort();
        }
    }

    tracing::info!("HTTP server stopped");
    Ok(())
}
