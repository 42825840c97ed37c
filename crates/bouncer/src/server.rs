//! HTTP front end for the webhook.
//!
//! Routes:
//!
//! - `POST /v1` - settle a `TokenReview`
//! - `/healthz` - liveness, always `ok`
//! - `GET /version` - build version as JSON
//!
//! Connections are served with hyper's HTTP/1 connection builder, optionally
//! behind mutual TLS. On shutdown the listener is closed and in-flight
//! connections are allowed to finish.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, Limited};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use bouncer_telemetry::metrics::record_request;
use bouncer_telemetry::LatencyTimer;

use crate::alert::AlertSink;
use crate::authn::{Authenticator, AuthenticatorSettings};
use crate::config::BouncerConfig;
use crate::error::{BouncerError, BouncerResult};
use crate::identity::IdentityClient;
use crate::policy::RoleMapper;
use crate::tls;

/// Review endpoint.
pub const REVIEW_PATH: &str = "/v1";
/// Liveness endpoint.
pub const HEALTH_PATH: &str = "/healthz";
/// Version endpoint.
pub const VERSION_PATH: &str = "/version";

/// Largest accepted review body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;
/// Time a client gets to complete the TLS handshake.
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Response body type.
pub type ResponseBody = Full<Bytes>;

/// Response type.
pub type HttpResponse = Response<ResponseBody>;

/// Request dispatcher shared by every connection.
#[derive(Debug)]
pub struct Router {
    authenticator: Arc<Authenticator>,
    timer: Arc<LatencyTimer>,
}

impl Router {
    /// Create a router; `/v1` latencies are recorded into `timer`.
    pub fn new(authenticator: Arc<Authenticator>, timer: Arc<LatencyTimer>) -> Self {
        Self {
            authenticator,
            timer,
        }
    }

    /// The authenticator behind `/v1`.
    pub fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    /// Handles `req` inside a request span.
    pub async fn dispatch<B>(&self, req: Request<B>, peer: SocketAddr) -> HttpResponse
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let request_id = Uuid::now_v7();
        let span = info_span!(
            "request",
            %request_id,
            method = %req.method(),
            path = %req.uri().path(),
            %peer,
        );
        self.handle(req).instrument(span).await
    }

    /// Routes `req` and records its latency.
    pub async fn handle<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let path = metric_path(req.uri().path());

        let response = match path {
            REVIEW_PATH => self.review(req).await,
            HEALTH_PATH => text_response(StatusCode::OK, "ok"),
            VERSION_PATH if req.method() == Method::GET => version_response(),
            VERSION_PATH => method_not_allowed(&req, "GET"),
            _ => text_response(StatusCode::NOT_FOUND, "404 page not found\n"),
        };

        let elapsed = start.elapsed();
        if path == REVIEW_PATH {
            self.timer.update(elapsed);
        }
        record_request(path, response.status().as_u16(), elapsed);
        debug!(
            status = response.status().as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "request completed"
        );
        response
    }

    async fn review<B>(&self, req: Request<B>) -> HttpResponse
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if req.method() != Method::POST {
            return method_not_allowed(&req, "POST");
        }

        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(_) => {
                return error_response(&BouncerError::bad_request("read tokenreview request body"))
            }
        };

        let review = match self.authenticator.review(&body).await {
            Ok(review) => review,
            Err(e) => return error_response(&e),
        };

        match serde_json::to_vec(&review) {
            Ok(encoded) => {
                let mut response = Response::new(Full::new(Bytes::from(encoded)));
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                response
            }
            Err(_) => error_response(&BouncerError::internal("encode tokenreview response")),
        }
    }
}

fn metric_path(path: &str) -> &'static str {
    match path {
        REVIEW_PATH => REVIEW_PATH,
        HEALTH_PATH => HEALTH_PATH,
        VERSION_PATH => VERSION_PATH,
        _ => "other",
    }
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn version_response() -> HttpResponse {
    let body = serde_json::json!({ "version": crate::VERSION }).to_string();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Generic status-text response; the detail stays in the log.
fn status_response(status: StatusCode) -> HttpResponse {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = Response::new(Full::new(Bytes::from(format!("{reason}\n"))));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn method_not_allowed<B>(req: &Request<B>, allow: &'static str) -> HttpResponse {
    let mut response = error_response(&BouncerError::method_not_allowed(req.method().as_str()));
    response
        .headers_mut()
        .insert(ALLOW, HeaderValue::from_static(allow));
    response
}

fn error_response(err: &BouncerError) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(category = err.category(), error = %err, "request failed");
    } else {
        warn!(category = err.category(), error = %err, "request rejected");
    }
    status_response(status)
}

/// Completes on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

async fn serve_connection<I>(
    io: I,
    router: Arc<Router>,
    peer: SocketAddr,
    mut stop: watch::Receiver<bool>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = service_fn(move |req| {
        let router = Arc::clone(&router);
        async move { Ok::<_, Infallible>(router.dispatch(req, peer).await) }
    });

    let conn = http1::Builder::new().serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = stop.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        debug!(%peer, error = %e, "connection closed with error");
    }
}

/// The webhook server.
pub struct BouncerServer {
    config: BouncerConfig,
    router: Arc<Router>,
    timer: Arc<LatencyTimer>,
    tls: Option<TlsAcceptor>,
    handshake_timeout: Duration,
}

impl std::fmt::Debug for BouncerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BouncerServer")
            .field("addr", &self.config.addr)
            .field("tls", &self.tls.is_some())
            .finish_non_exhaustive()
    }
}

impl BouncerServer {
    /// Wires the identity client, role mapper, alert sink, authenticator and
    /// TLS material described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error for a partial TLS triad, unreadable TLS material, an
    /// unusable identity URL or a zero cache size.
    pub fn new(config: BouncerConfig) -> BouncerResult<Self> {
        let identity = IdentityClient::new(&config.identity_url, config.identity_timeout)?;
        let roles = RoleMapper::from_file(&config.role_mapping_source);
        let alerts = AlertSink::new(config.alert.clone())
            .map_err(|e| BouncerError::server(format!("build alert client: {e}")))?;
        let authenticator = Authenticator::new(
            Arc::new(identity),
            roles,
            AuthenticatorSettings::from(&config),
            alerts,
        )?;

        let tls = match config.tls_files()? {
            Some(files) => Some(tls::acceptor(&files)?),
            None => None,
        };

        let timer = Arc::new(LatencyTimer::new());
        let router = Arc::new(Router::new(Arc::new(authenticator), Arc::clone(&timer)));

        Ok(Self {
            config,
            router,
            timer,
            tls,
            handshake_timeout: TLS_HANDSHAKE_TIMEOUT,
        })
    }

    /// Overrides [`TLS_HANDSHAKE_TIMEOUT`].
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Server configuration.
    pub fn config(&self) -> &BouncerConfig {
        &self.config
    }

    /// Shared request router.
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    /// Latency timer fed by `/v1`.
    pub fn timer(&self) -> Arc<LatencyTimer> {
        Arc::clone(&self.timer)
    }

    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns `BouncerError::Server` if the address cannot be bound.
    pub async fn bind(&self) -> BouncerResult<TcpListener> {
        let addr = self.config.listen_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|e| BouncerError::server(format!("bind {addr}: {e}")))
    }

    /// Serves connections from `listener` until `shutdown` completes, then
    /// waits for open connections to finish.
    ///
    /// # Errors
    ///
    /// Returns `BouncerError::Io` if the listener address is unavailable.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> BouncerResult<()>
    where
        F: Future<Output = ()> + Send,
    {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, tls = self.tls.is_some(), "listening");

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };
                    let router = Arc::clone(&self.router);
                    let stop = stop_rx.clone();
                    match self.tls.clone() {
                        Some(acceptor) => {
                            let handshake =
                                tokio::time::timeout(self.handshake_timeout, acceptor.accept(stream));
                            connections.spawn(async move {
                                match handshake.await {
                                    Ok(Ok(stream)) => {
                                        serve_connection(stream, router, peer, stop).await;
                                    }
                                    Ok(Err(e)) => debug!(%peer, error = %e, "tls handshake failed"),
                                    Err(_) => debug!(%peer, "tls handshake timed out"),
                                }
                            });
                        }
                        None => {
                            connections.spawn(serve_connection(stream, router, peer, stop));
                        }
                    }
                }
                () = &mut shutdown => {
                    info!("shutdown signal received, stopping listener");
                    break;
                }
            }
            while connections.try_join_next().is_some() {}
        }

        drop(listener);
        let _ = stop_tx.send(true);
        info!(connections = connections.len(), "waiting for open connections");
        while connections.join_next().await.is_some() {}
        info!("server stopped");
        Ok(())
    }

    /// Binds, then serves until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// See [`BouncerServer::bind`] and [`BouncerServer::serve`].
    pub async fn run(self) -> BouncerResult<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_signal()).await
    }
}
