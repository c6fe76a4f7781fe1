use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant as StdInstant;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use tower::{Layer, Service};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::channel::channel;
use crate::client::{new_client_id, ClientHandle};
use crate::config::{origin_allowed, Config};
use crate::hub::Hub;
use crate::rate_limiter::RateLimiter;
use crate::socket;

/// maximum inbound frame size: 64 KiB.
const MAX_FRAME_SIZE: usize = 64 * 1024;

pub struct AppState {
    pub hub: Arc<Hub>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: Arc<Config>,
    pub started_at: StdInstant,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.allow_list());

    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .fallback(not_found)
        .layer(cors)
        .layer(SecurityHeadersLayer)
        .with_state(state)
}

fn cors_layer(allow_list: &[String]) -> CorsLayer {
    if allow_list.is_empty() {
        // development default: accept any origin.
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allow_list = allow_list.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin
                .to_str()
                .map(|origin| origin_allowed(&allow_list, origin))
                .unwrap_or(false)
        }))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

/// extract the source-address key for rate limiting: the first entry of a
/// forwarded-for header chain, then a real-ip header, then the transport
/// peer address.
fn source_key(headers: &HeaderMap, peer: SocketAddr) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.trim().is_empty() {
            return real_ip.trim().to_string();
        }
    }

    peer.ip().to_string()
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let key = source_key(&headers, peer);
    if !state.rate_limiter.allow(&key).await {
        log::warn!("rate limit refused admission: key={}", key);
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }

    let allow_list = state.config.allow_list();
    if !allow_list.is_empty() {
        let origin = headers
            .get(axum::http::header::ORIGIN)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !origin_allowed(&allow_list, origin) {
            log::warn!("origin not allow-listed: origin={:?}", origin);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    ws.max_frame_size(MAX_FRAME_SIZE)
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| async move {
            let (tx, rx) = channel();
            let client = Arc::new(ClientHandle::new(new_client_id(), tx));

            state.hub.register(client.clone()).await;
            socket::serve(socket, state.hub.clone(), client, rx).await;
        })
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    uptime_seconds: u64,
    total_connections: u64,
    room_count: usize,
    client_count: usize,
    version: &'static str,
    timestamp: String,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> axum::Json<Health> {
    let snapshot = state.hub.snapshot().await;

    axum::Json(Health {
        status: "healthy",
        service: "signal-hub",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        total_connections: snapshot.total_connections,
        room_count: snapshot.room_count,
        client_count: snapshot.client_count,
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// injects the fixed set of security headers the spec requires on every
/// response, the same `tower::Layer`/`tower::Service` shape the teacher
/// uses for its own request logging layer.
#[derive(Clone, Default)]
struct SecurityHeadersLayer;

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersService { inner }
    }
}

#[derive(Clone)]
struct SecurityHeadersService<S> {
    inner: S,
}

impl<S, Body> Service<Request<Body>> for SecurityHeadersService<S>
where
    S: Service<Request<Body>, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    Body: Send + 'static,
{
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;
    type Response = Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let fut = self.inner.call(req);
        Box::pin(async move {
            let mut response = fut.await?;
            let headers = response.headers_mut();

            headers.insert(
                "content-security-policy",
                HeaderValue::from_static(
                    "default-src 'self'; font-src 'self' https://fonts.gstatic.com; \
                     connect-src 'self' wss: ws:",
                ),
            );
            headers.insert("x-content-type-options", HeaderValue::from_static("nosniff"));
            headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
            headers.insert(
                "referrer-policy",
                HeaderValue::from_static("strict-origin-when-cross-origin"),
            );
            headers.insert(
                "permissions-policy",
                HeaderValue::from_static("geolocation=(), microphone=(), camera=()"),
            );

            Ok(response)
        })
    }
}
