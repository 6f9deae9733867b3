use std::future::Future;

use http::{HeaderMap, Method, StatusCode};
use url::Url;

use crate::TransportError;

/// A single attempt, as handed to the transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute target URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Serialized body.
    pub body: Option<Vec<u8>>,
}

/// A response as received from the server.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Full response body.
    pub body: Vec<u8>,
}

/// Sends one attempt over the wire.
pub trait Transport: Send + Sync {
    /// Sends the request and reads the full response.
    fn send(&self, request: TransportRequest) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// Transport over a pooled reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh connection pool.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::InvalidRequest(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Wraps an existing reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn transport_error(error: reqwest::Error) -> TransportError {
    if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else {
        TransportError::Network(error.to_string())
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(transport_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(transport_error)?.to_vec();

        Ok(TransportResponse { status, headers, body })
    }
}
