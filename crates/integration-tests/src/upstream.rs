//! A small service standing in for whatever turnstile protects.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Token handed out by `/auth/login` and accepted by `/private`.
pub const TOKEN: &str = "upstream-token";

/// Password accepted by `/auth/login`.
pub const PASSWORD: &str = "correct horse";

#[derive(Default)]
struct UpstreamState {
    hits: AtomicU32,
    flaky_failures: AtomicU32,
}

/// Upstream service with a handful of scripted endpoints:
///
/// - `GET /items`: a JSON list
/// - `GET /private`: 401 unless the token from `/auth/login` is sent
/// - `GET /flaky`: 503 for as many calls as configured, then 200
/// - `GET /broken`: always 503
/// - `POST /auth/login`, `POST /auth/logout`
pub struct MockUpstream {
    address: SocketAddr,
    state: Arc<UpstreamState>,
    shutdown: CancellationToken,
}

impl MockUpstream {
    /// Starts the service on an ephemeral port.
    pub async fn start() -> Self {
        let state = Arc::new(UpstreamState::default());

        let app = Router::new()
            .route("/items", get(items))
            .route("/private", get(private))
            .route("/flaky", get(flaky))
            .route("/broken", get(broken))
            .route("/auth/login", post(login))
            .route("/auth/logout", post(logout))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.clone().cancelled_owned())
                .into_future(),
        );

        Self {
            address,
            state,
            shutdown,
        }
    }

    /// Base URL of the service.
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.address)).unwrap()
    }

    /// Requests received so far.
    pub fn hits(&self) -> u32 {
        self.state.hits.load(Ordering::Relaxed)
    }

    /// Makes the next `n` calls to `/flaky` fail with 503.
    pub fn fail_next(&self, n: u32) {
        self.state.flaky_failures.store(n, Ordering::Relaxed);
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn items(State(state): State<Arc<UpstreamState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::Relaxed);
    Json(json!({ "items": ["a", "b", "c"] }))
}

async fn private(State(state): State<Arc<UpstreamState>>, headers: HeaderMap) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::Relaxed);

    let expected = format!("Bearer {TOKEN}");
    let authorized = headers
        .get("authorization")
        .is_some_and(|value| value.as_bytes() == expected.as_bytes());

    if authorized {
        (StatusCode::OK, Json(json!({ "secret": 42 })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Invalid token" })))
    }
}

async fn flaky(State(state): State<Arc<UpstreamState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::Relaxed);

    let failing = state
        .flaky_failures
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
        .is_ok();

    if failing {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "Try again" })))
    } else {
        (StatusCode::OK, Json(json!({ "status": "recovered" })))
    }
}

async fn broken(State(state): State<Arc<UpstreamState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::Relaxed);
    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "Down for maintenance" })))
}

async fn login(State(state): State<Arc<UpstreamState>>, Json(body): Json<serde_json::Value>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::Relaxed);

    if body["password"] == PASSWORD {
        (StatusCode::OK, Json(json!({ "token": TOKEN })))
    } else {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "Wrong password" })))
    }
}

async fn logout(State(state): State<Arc<UpstreamState>>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::Relaxed);
    StatusCode::NO_CONTENT
}
