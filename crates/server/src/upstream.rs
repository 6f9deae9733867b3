//! Forwarding of admitted requests to the protected service.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
};
use config::UpstreamConfig;
use http::{HeaderMap, StatusCode, header};
use serde_json::json;
use url::Url;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, thiserror::Error)]
enum ForwardError {
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("invalid upstream URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
}

impl ForwardError {
    fn status(&self) -> StatusCode {
        match self {
            ForwardError::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ForwardError::Url(_) => StatusCode::BAD_REQUEST,
            ForwardError::Request(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Request(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

pub(crate) struct Upstream {
    client: reqwest::Client,
    base_url: Url,
    max_body_size: usize,
}

impl Upstream {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.clone(),
            max_body_size: config.max_body_size,
        })
    }

    fn target(&self, request: &Request) -> Result<Url, ForwardError> {
        let path_and_query = request.uri().path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let base = self.base_url.as_str().trim_end_matches('/');

        Ok(Url::parse(&format!("{base}{path_and_query}"))?)
    }

    async fn send(&self, request: Request) -> Result<Response, ForwardError> {
        let url = self.target(&request)?;
        let (parts, body) = request.into_parts();

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|_| ForwardError::BodyTooLarge(self.max_body_size))?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let body = upstream.bytes().await?;

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;

        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

pub(crate) async fn forward(State(upstream): State<Arc<Upstream>>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match upstream.send(request).await {
        Ok(response) => response,
        Err(e) => {
            log::warn!("Forwarding {method} {path} upstream failed: {e}");

            let status = e.status();
            let message = match status {
                StatusCode::PAYLOAD_TOO_LARGE => "Request body too large",
                StatusCode::BAD_REQUEST => "Invalid request target",
                StatusCode::GATEWAY_TIMEOUT => "Upstream service timed out",
                _ => "Upstream service unavailable",
            };

            (status, Json(json!({ "error": message }))).into_response()
        }
    }
}

pub(crate) async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
}
