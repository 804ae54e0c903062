//! HTTP transport adapter.
//!
//! # Responsibilities
//! - Create the Axum router that feeds every request into the application
//! - Wire up middleware (tracing, concurrency cap, request ID, timeouts)
//! - Bind plain and TLS listeners
//! - Coordinate graceful shutdown
//!
//! # Data Flow
//! ```text
//! hyper request
//!     → buffer body (bounded, 413 on overflow)
//!     → core Request (method lower-cased, path decoded, query parsed)
//!     → App::handle on the blocking pool, Response bound to a ChannelSink
//!     → head arrives through a oneshot, body chunks through an mpsc
//!     → streamed hyper response
//! ```
//!
//! # Design Decisions
//! - The core is synchronous per request; only the adapter is async
//! - A flow that finishes without ever committing a head is answered with 500

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderName, Request as HttpRequest, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tower::limit::GlobalConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::app::App;
use crate::config::ServerConfig;
use crate::http::request::Request;
use crate::http::response::Response;
use crate::http::sink::{OutputSink, ResponseHead};
use crate::lifecycle::Shutdown;
use crate::net::load_tls_config;

/// Header carrying the per-request correlation id.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Body chunks buffered between the handler thread and the connection.
const BODY_CHANNEL_DEPTH: usize = 8;

/// How long TLS connections may drain after `stop()`.
const TLS_DRAIN: Duration = Duration::from_secs(10);

/// State injected into the fallback handler.
#[derive(Clone)]
struct ServerState {
    app: Arc<App>,
    max_body_size: usize,
}

/// HTTP server for an application.
#[derive(Clone)]
pub struct HttpServer {
    app: Arc<App>,
    config: ServerConfig,
    shutdown: Shutdown,
}

impl HttpServer {
    /// Create a new HTTP server serving `app`.
    pub fn new(app: App, config: ServerConfig) -> Self {
        Self {
            app: Arc::new(app),
            config,
            shutdown: Shutdown::new(),
        }
    }

    pub fn app(&self) -> &Arc<App> {
        &self.app
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Coordinator that stops every listener this server runs.
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Build the Axum router with all middleware layers.
    pub fn router(&self) -> Router {
        let state = ServerState {
            app: self.app.clone(),
            max_body_size: self.config.limits.max_body_size,
        };
        let request_id = HeaderName::from_static(X_REQUEST_ID);

        Router::new().fallback(dispatch).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
                .layer(TraceLayer::new_for_http().make_span_with(|req: &HttpRequest<Body>| {
                    let request_id = req
                        .headers()
                        .get(X_REQUEST_ID)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown");
                    tracing::info_span!(
                        "request",
                        method = %req.method(),
                        uri = %req.uri(),
                        request_id = %request_id,
                    )
                }))
                .layer(PropagateRequestIdLayer::new(request_id))
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    Duration::from_secs(self.config.timeouts.request_secs),
                ))
                .layer(GlobalConcurrencyLimitLayer::new(self.config.listener.max_connections)),
        )
    }

    /// Serve on an already bound listener until `stop()`.
    pub async fn run(&self, listener: TcpListener) -> io::Result<()> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "HTTP server starting");

        let shutdown = self.shutdown.clone();
        axum::serve(
            listener,
            self.router().into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

        info!(address = %addr, "HTTP server stopped");
        Ok(())
    }

    /// Bind the configured interface on `port` and serve.
    pub async fn listen(&self, port: u16) -> io::Result<()> {
        let addr = self.bind_address(port)?;
        let listener = TcpListener::bind(addr).await?;
        self.run(listener).await
    }

    /// Serve plain HTTP on `port` and HTTPS on `ssl_port`.
    ///
    /// Without TLS configuration only the plain listener runs.
    pub async fn listen_ssl(&self, port: u16, ssl_port: u16) -> io::Result<()> {
        let Some(tls) = &self.config.tls else {
            warn!("TLS is not configured, serving plain HTTP only");
            return self.listen(port).await;
        };
        let rustls = load_tls_config(Path::new(&tls.cert_path), Path::new(&tls.key_path)).await?;
        let ssl_addr = self.bind_address(ssl_port)?;

        let handle = axum_server::Handle::new();
        let shutdown = self.shutdown.clone();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.wait().await;
            drain.graceful_shutdown(Some(TLS_DRAIN));
        });

        info!(address = %ssl_addr, "HTTPS server starting");
        let secure = axum_server::bind_rustls(ssl_addr, rustls)
            .handle(handle)
            .serve(self.router().into_make_service_with_connect_info::<SocketAddr>());

        tokio::try_join!(self.listen(port), secure)?;
        Ok(())
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn stop(&self) {
        info!("Stopping HTTP server");
        self.shutdown.trigger();
    }

    fn bind_address(&self, port: u16) -> io::Result<SocketAddr> {
        let mut addr: SocketAddr = self.config.listener.bind_address.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid bind address {:?}: {}", self.config.listener.bind_address, e),
            )
        })?;
        addr.set_port(port);
        Ok(addr)
    }
}

/// Feed one request through the application.
async fn dispatch(State(state): State<ServerState>, request: HttpRequest<Body>) -> HttpResponse {
    let (parts, body) = request.into_parts();

    let bytes = match to_bytes(body, state.max_body_size).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "Rejected request body");
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut builder = Request::builder(parts.method.as_str(), target)
        .headers(parts.headers)
        .version(parts.version)
        .body(bytes);
    if let Some(ConnectInfo(peer)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        builder = builder.remote_addr(*peer);
    }
    let req = match builder.build() {
        Ok(req) => req,
        Err(e) => {
            debug!(error = %e, "Rejected malformed request");
            return (e.status_code(), e.to_string()).into_response();
        }
    };

    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(BODY_CHANNEL_DEPTH);
    let app = state.app.clone();
    tokio::task::spawn_blocking(move || {
        let res = Response::new(ChannelSink::new(head_tx, body_tx));
        app.handle(req, res);
    });

    let head = match head_rx.await {
        Ok(head) => head,
        Err(_) => {
            error!("Request finished without a response");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let chunks = futures_util::stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    let mut response = HttpResponse::new(Body::from_stream(chunks));
    *response.status_mut() =
        StatusCode::from_u16(head.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = head.headers;
    response
}

/// Output channel from the blocking handler thread to the connection.
struct ChannelSink {
    head: Option<oneshot::Sender<ResponseHead>>,
    body: Option<mpsc::Sender<io::Result<Bytes>>>,
}

impl ChannelSink {
    fn new(
        head: oneshot::Sender<ResponseHead>,
        body: mpsc::Sender<io::Result<Bytes>>,
    ) -> Self {
        Self {
            head: Some(head),
            body: Some(body),
        }
    }
}

fn client_gone() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client went away")
}

impl OutputSink for ChannelSink {
    fn write_head(&mut self, head: &ResponseHead) -> io::Result<()> {
        let tx = self
            .head
            .take()
            .ok_or_else(|| io::Error::other("head already written"))?;
        tx.send(head.clone()).map_err(|_| client_gone())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        let tx = self.body.as_ref().ok_or_else(|| io::Error::other("body closed"))?;
        tx.blocking_send(Ok(Bytes::copy_from_slice(chunk)))
            .map_err(|_| client_gone())
    }

    fn close(&mut self) -> io::Result<()> {
        self.head.take();
        self.body.take();
        Ok(())
    }
}
