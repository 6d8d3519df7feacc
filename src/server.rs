//! # HTTP Server
//!
//! Exposes the relay over HTTP with `axum`:
//!
//! * `POST /notifr?target=<name>` with a JSON body `{"subject"?: "...", "text": "..."}`
//!   fans the message out to the target's channels. It answers `200` once every
//!   delivery has finished, whatever their outcome, and `400` with a plain-text
//!   reason for malformed requests.
//! * `GET /stat` reports the running version.
//!
//! The server shuts down gracefully on a signal from the application, letting
//! in-flight fan-outs complete.

use crate::dispatch::{Dispatcher, RequestError};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

/// The path messages are posted to.
pub const NOTIFY_PATH: &str = "/notifr";
/// The path of the status endpoint.
pub const STAT_PATH: &str = "/stat";

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        metrics::counter!("notifr_requests_rejected_total").increment(1);
        (StatusCode::BAD_REQUEST, format!("{self}\n")).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NotifyParams {
    #[serde(default)]
    pub target: Option<String>,
}

/// Builds the router serving the relay endpoints.
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route(NOTIFY_PATH, post(notify))
        .route(STAT_PATH, get(stat))
        .with_state(dispatcher)
}

#[instrument(skip_all)]
async fn notify(
    State(dispatcher): State<Dispatcher>,
    Query(params): Query<NotifyParams>,
    body: Bytes,
) -> Result<StatusCode, RequestError> {
    metrics::counter!("notifr_requests_total").increment(1);
    let target_name = params.target.as_deref().unwrap_or_default();
    match dispatcher.notify(target_name, &body).await {
        Ok(_) => Ok(StatusCode::OK),
        Err(err) => {
            debug!(error = %err, "Rejected request");
            Err(err)
        }
    }
}

async fn stat() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// Serves the router on an already bound listener.
pub struct Server {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    pub fn new(listener: TcpListener, router: Router, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            router,
            shutdown_rx,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a future that serves until the shutdown signal fires.
    pub fn run(self) -> impl Future<Output = std::io::Result<()>> {
        let mut shutdown_rx = self.shutdown_rx;
        async move {
            let shutdown = async move {
                // A dropped sender also counts as a shutdown request.
                let _ = shutdown_rx.changed().await;
                info!("HTTP server received shutdown signal");
            };
            let result = axum::serve(self.listener, self.router)
                .with_graceful_shutdown(shutdown)
                .await;
            if let Err(e) = &result {
                error!("HTTP server error: {}", e);
            }
            result
        }
    }
}
