//! HTTP server setup and request proxying.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Select an upstream per request and forward to it
//! - Run the response interceptor before anything reaches the client
//! - Swap the full proxy state atomically on config reload

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::uri::{Authority, Scheme},
    http::{header, HeaderMap, HeaderValue, Request, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::{validate_config, ProxyConfig, ValidationError};
use crate::http::request::RequestContext;
use crate::intercept::{BufferedResponse, Decision, Interceptor, Replacer, ResponseWriter};
use crate::observability::metrics;
use crate::selection::{self, Policy};
use crate::streaming::{BufferPool, FlushInterval, DEFAULT_BUFFER_SIZE};
use crate::upstream::{ActiveRequestGuard, HostRegistry, UpstreamPool};

/// Largest backend response the diverted pipeline will buffer.
const MAX_BUFFERED_BODY: usize = 4 * 1024 * 1024;

/// Everything derived from one configuration. Replaced wholesale on
/// reload; in-flight requests keep the snapshot they started with.
pub struct ProxyState {
    pub config: ProxyConfig,
    pub pool: UpstreamPool,
    pub policy: Box<dyn Policy>,
    pub interceptor: Interceptor,
    pub flush: FlushInterval,
}

impl ProxyState {
    /// Build a state from a validated configuration, reusing host
    /// records from the registry so counters survive reloads.
    pub fn provision(
        config: ProxyConfig,
        registry: &HostRegistry,
    ) -> Result<Self, Vec<ValidationError>> {
        validate_config(&config)?;

        let pool = UpstreamPool::provision(
            config.upstreams.iter().map(|u| u.dial.as_str()),
            config.max_requests_per_host,
            registry,
        );
        let policy = selection::from_config(&config.load_balancing);
        let interceptor = Interceptor::provision(&config.handle_response).map_err(|e| vec![e])?;
        let flush = FlushInterval::from_millis(config.timeouts.flush_interval_ms);

        Ok(Self {
            config,
            pool,
            policy,
            interceptor,
            flush,
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<ProxyState>>,
    pub registry: Arc<HostRegistry>,
    pub client: Client<HttpConnector, Body>,
    pub buffers: Arc<BufferPool>,
}

impl AppState {
    pub fn new(config: ProxyConfig) -> Result<Self, Vec<ValidationError>> {
        let registry = Arc::new(HostRegistry::new());
        let state = ProxyState::provision(config, &registry)?;
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(state)),
            registry,
            client,
            buffers: BufferPool::new(DEFAULT_BUFFER_SIZE),
        })
    }

    /// Swap in a new configuration. The pool reference is replaced,
    /// never edited; a request never observes a half-updated pool.
    pub fn reload(&self, config: ProxyConfig) -> Result<(), Vec<ValidationError>> {
        let state = ProxyState::provision(config, &self.registry)?;
        self.inner.store(Arc::new(state));
        tracing::info!("configuration reloaded");
        Ok(())
    }
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let request_secs = state.inner.load().config.timeouts.request_secs;
        let router = Self::build_router(state, request_secs);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState, request_secs: u64) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(request_secs)))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler: select an upstream, forward, intercept the
/// response.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let start_time = Instant::now();
    let inner = state.inner.load_full();

    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let method_str = method.to_string();
    let uri_str = request
        .uri()
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let authority = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()));

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        uri = %uri_str,
        "proxying request"
    );

    let (parts, body) = request.into_parts();

    // Select an upstream. Sticky policies may set a cookie on the
    // response headers we carry forward.
    let ctx = RequestContext::new(
        client_ip(&addr),
        uri_str.clone(),
        authority,
        &parts.headers,
        false,
        &inner.config.trusted_proxies,
    );
    let mut sticky_headers = HeaderMap::new();
    let Some(host) = inner
        .policy
        .select(inner.pool.hosts(), &ctx, Some(&mut sticky_headers))
    else {
        tracing::warn!(request_id = %request_id, "no upstream available");
        metrics::record_request(&method_str, 502, "none", start_time);
        return (StatusCode::BAD_GATEWAY, "No upstream available").into_response();
    };
    tracing::debug!(request_id = %request_id, upstream = %host, "upstream selected");
    let guard = host.count_request();
    let dial = host.dial().to_string();

    // URI rewrite onto the selected upstream.
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    if let Ok(auth) = Authority::from_str(&dial) {
        uri_parts.authority = Some(auth);
    }
    let uri = Uri::from_parts(uri_parts).unwrap_or_else(|_| parts.uri.clone());

    let mut builder = Request::builder()
        .method(method.clone())
        .uri(uri)
        .version(parts.version);
    if let Some(headers) = builder.headers_mut() {
        for (k, v) in parts.headers.iter() {
            headers.insert(k.clone(), v.clone());
        }
        if let Ok(value) = HeaderValue::from_str(&request_id) {
            headers.insert("x-request-id", value);
        }
    }
    let Ok(req) = builder.body(body) else {
        metrics::record_request(&method_str, 500, &dial, start_time);
        return (StatusCode::INTERNAL_SERVER_ERROR, "Bad proxied request").into_response();
    };

    let response = match state.client.request(req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %dial, error = %e, "upstream error");
            host.count_fail();
            drop(guard);
            metrics::record_request(&method_str, 502, &dial, start_time);
            metrics::record_upstream_failure(&dial);
            return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
        }
    };

    // Protocol upgrades (WebSocket, CONNECT-style) bypass
    // interception: tunnel raw bytes both ways once each side
    // completes its upgrade.
    if response.status() == StatusCode::SWITCHING_PROTOCOLS {
        let mut parts = parts;
        let client_upgrade = parts.extensions.remove::<hyper::upgrade::OnUpgrade>();
        let (resp_parts, _) = response.into_parts();
        let mut out = Response::from_parts(resp_parts, Body::empty());
        let upstream_upgrade = hyper::upgrade::on(&mut out);
        if let Some(client_upgrade) = client_upgrade {
            let buffers = Arc::clone(&state.buffers);
            let flush = inner.flush;
            let rid = request_id.clone();
            tokio::spawn(async move {
                let _guard = guard;
                if let Err(e) = tunnel_upgraded(client_upgrade, upstream_upgrade, buffers, flush).await
                {
                    tracing::debug!(request_id = %rid, error = %e, "upgrade tunnel closed");
                }
            });
        }
        metrics::record_request(&method_str, 101, &dial, start_time);
        return out;
    }

    // Response interception: decide before any byte reaches the
    // client.
    let (resp_parts, resp_body) = response.into_parts();
    let mut repl = Replacer::new();
    repl.set("http.request.method", method_str.clone());
    repl.set("http.request.uri", uri_str.clone());
    let decision = inner
        .interceptor
        .evaluate(resp_parts.status, &resp_parts.headers, &repl);

    let mut out = match decision {
        Decision::StreamThrough => {
            Response::from_parts(resp_parts, guarded_body(resp_body, guard))
        }
        Decision::ReplaceStatus(status) => {
            let mut resp_parts = resp_parts;
            resp_parts.status = status;
            Response::from_parts(resp_parts, guarded_body(resp_body, guard))
        }
        Decision::Divert(index) => {
            let collected = match axum::body::to_bytes(Body::new(resp_body), MAX_BUFFERED_BODY).await
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "failed to buffer upstream response");
                    host.count_fail();
                    drop(guard);
                    metrics::record_request(&method_str, 502, &dial, start_time);
                    metrics::record_upstream_failure(&dial);
                    return (StatusCode::BAD_GATEWAY, "Upstream body error").into_response();
                }
            };
            drop(guard);
            let buffered = BufferedResponse {
                status: resp_parts.status,
                headers: resp_parts.headers,
                body: collected,
            };

            let mut writer = ResponseWriter::new();
            match inner
                .interceptor
                .run_routes(index, buffered, &mut writer, &mut repl)
            {
                Ok(()) => {
                    let (status, headers, body) = writer.into_parts();
                    let mut response = Response::builder()
                        .status(status)
                        .body(Body::from(body))
                        .unwrap_or_default();
                    *response.headers_mut() = headers;
                    response
                }
                Err(e) => {
                    tracing::error!(request_id = %request_id, error = %e, "response route failed");
                    (e.status(), e.to_string()).into_response()
                }
            }
        }
    };

    merge_headers(out.headers_mut(), sticky_headers);
    metrics::record_request(&method_str, out.status().as_u16(), &dial, start_time);
    out
}

/// Response body that keeps the host's active-request count up until
/// the body is fully streamed or dropped.
struct GuardedBody {
    inner: Body,
    _guard: ActiveRequestGuard,
}

impl http_body::Body for GuardedBody {
    type Data = bytes::Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Result<http_body::Frame<Self::Data>, Self::Error>>> {
        std::pin::Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> http_body::SizeHint {
        self.inner.size_hint()
    }
}

fn guarded_body(body: hyper::body::Incoming, guard: ActiveRequestGuard) -> Body {
    Body::new(GuardedBody {
        inner: Body::new(body),
        _guard: guard,
    })
}

fn client_ip(addr: &SocketAddr) -> IpAddr {
    addr.ip()
}

/// Shuttle bytes both ways between an upgraded client connection and
/// an upgraded upstream connection until either side closes.
async fn tunnel_upgraded(
    client_upgrade: hyper::upgrade::OnUpgrade,
    upstream_upgrade: hyper::upgrade::OnUpgrade,
    buffers: Arc<BufferPool>,
    flush: FlushInterval,
) -> std::io::Result<()> {
    let (client, upstream) = tokio::try_join!(client_upgrade, upstream_upgrade)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::ConnectionAborted, e))?;

    let (mut client_read, mut client_write) = tokio::io::split(TokioIo::new(client));
    let (mut upstream_read, mut upstream_write) = tokio::io::split(TokioIo::new(upstream));

    let up = crate::streaming::copy_stream(&mut client_read, &mut upstream_write, &buffers, flush);
    let down = crate::streaming::copy_stream(&mut upstream_read, &mut client_write, &buffers, flush);
    let (sent, received) = tokio::try_join!(up, down)?;
    tracing::debug!(sent, received, "upgrade tunnel finished");
    Ok(())
}

fn merge_headers(dst: &mut HeaderMap, src: HeaderMap) {
    for (name, value) in src {
        if let Some(name) = name {
            dst.append(name, value);
        }
    }
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        return;
    }
    tracing::info!("shutdown signal received");
}
