//! HTTP Server
//!
//! ```text
//! POST /receive   remote-write ingestion
//! GET  /metrics   text exposition of the registry
//! GET  /healthz   liveness
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::receiver::Receiver;

/// State shared by every connection.
pub struct AppState {
    pub receiver: Receiver,
    pub registry: Registry,
}

impl AppState {
    pub fn new(receiver: Receiver, registry: Registry) -> Self {
        Self { receiver, registry }
    }
}

/// Accept connections on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {}: {}", addr, e)))?;

    info!("Listening on {}", addr);
    serve_listener(listener, state, shutdown).await
}

/// Accept connections on an already bound listener until `shutdown` is
/// cancelled.
pub async fn serve_listener(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP server shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?,
        };

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!("Connection from {} closed with error: {}", peer, e);
            }
        });
    }
}

async fn handle(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return Ok(respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
        }
    };

    Ok(route(&state, &parts.method, parts.uri.path(), &body))
}

/// Dispatch one request that has already been read into memory.
pub fn route(state: &AppState, method: &Method, path: &str, body: &[u8]) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::POST, "/receive") => receive(state, body),
        (&Method::GET, "/metrics") => metrics(&state.registry),
        (&Method::GET, "/healthz") => respond(StatusCode::OK, "ok"),
        (_, "/receive" | "/metrics" | "/healthz") => {
            respond(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
        }
        _ => respond(StatusCode::NOT_FOUND, "not found"),
    }
}

fn receive(state: &AppState, body: &[u8]) -> Response<Full<Bytes>> {
    match state.receiver.receive_body(body) {
        Ok(count) => {
            debug!("Received {} series", count);
            respond(StatusCode::NO_CONTENT, Bytes::new())
        }
        Err(e) if e.is_bad_request() => {
            debug!("Rejected remote-write body: {}", e);
            respond(StatusCode::BAD_REQUEST, e.to_string())
        }
        // Already logged during dispatch; the sender cannot act on it.
        Err(Error::Tracker { .. }) => respond(StatusCode::NO_CONTENT, Bytes::new()),
        Err(e) => {
            error!("Failed to process remote-write body: {}", e);
            respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn metrics(registry: &Registry) -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return respond(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }

    let mut response = respond(StatusCode::OK, buffer);
    if let Ok(value) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

// =============================================================================
// Tests
// =============================================================================
