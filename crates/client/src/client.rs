use std::time::Duration;

use config::ClientConfig;
use http::{
    HeaderMap, HeaderValue, Method, StatusCode,
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    ClientError, ClientThrottleWindow, Credentials, HttpTransport, RetryPolicy, Transport, TransportError,
    TransportRequest, TransportResponse, retry::RetryState,
};

/// Per-call options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,
    /// JSON body.
    pub body: Option<serde_json::Value>,
    /// Whether the stored bearer token must be attached.
    pub requires_auth: bool,
    /// Point in time after which no attempt is started and in-flight attempts are abandoned.
    pub deadline: Option<Instant>,
    /// Cancels the call, including pending backoff waits.
    pub cancellation: Option<CancellationToken>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::GET,
            body: None,
            requires_auth: true,
            deadline: None,
            cancellation: None,
        }
    }
}

impl RequestOptions {
    /// An authenticated GET.
    pub fn get() -> Self {
        Self::default()
    }

    /// An authenticated POST with a JSON body.
    pub fn post(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::default()
        }
    }

    /// Sends the call without credentials.
    pub fn without_auth(mut self) -> Self {
        self.requires_auth = false;
        self
    }

    /// Sets an absolute deadline.
    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets a deadline relative to now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    /// Attaches a cancellation token.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A successful response.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Response {
    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Raw body.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body deserialized from JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Error body fields turnstile and most services return.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    #[serde(alias = "message")]
    error: Option<String>,
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
}

enum Attempt {
    Success(Response),
    Retryable { reason: String, status: Option<StatusCode> },
    Terminal(ClientError),
}

/// Client for a service behind turnstile.
///
/// All calls, `login` and `logout` included, go through the same pipeline: self-throttle,
/// credentials, send, classification, linear backoff.
pub struct Client<T = HttpTransport> {
    transport: T,
    base_url: Url,
    login_path: String,
    logout_path: String,
    throttle: ClientThrottleWindow,
    credentials: Credentials,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

impl Client<HttpTransport> {
    /// Creates a client sending over HTTP.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::new().map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> Client<T> {
    /// Creates a client over a custom transport.
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self {
            transport,
            throttle: ClientThrottleWindow::from_config(&config.throttle),
            retry: RetryPolicy::from_config(&config.retry),
            attempt_timeout: config.attempt_timeout,
            base_url: config.base_url,
            login_path: config.login_path,
            logout_path: config.logout_path,
            credentials: Credentials::default(),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Stored credentials.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Whether a bearer token is stored.
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_present()
    }

    /// Exchanges a username and password for a bearer token and stores it.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<(), ClientError> {
        let body = json!({
            "username": username,
            "password": password.expose_secret(),
        });

        let options = RequestOptions::post(body).without_auth();
        let response = self.request(&self.login_path, options).await?;
        let LoginResponse { token } = response.json()?;

        self.credentials.set(SecretString::from(token));
        log::debug!("Logged in as '{username}'");

        Ok(())
    }

    /// Invalidates the session on the server, when there is one, and forgets the token.
    ///
    /// The server call is best-effort: credentials are cleared even when it fails.
    pub async fn logout(&self) {
        if self.credentials.is_present() {
            let options = RequestOptions {
                method: Method::POST,
                ..RequestOptions::default()
            };

            if let Err(e) = self.request(&self.logout_path, options).await {
                log::debug!("Logout request failed, clearing credentials anyway: {e}");
            }
        }

        self.credentials.clear();
    }

    /// An authenticated GET.
    pub async fn get(&self, endpoint: &str) -> Result<Response, ClientError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    /// An authenticated JSON POST.
    pub async fn post(&self, endpoint: &str, body: serde_json::Value) -> Result<Response, ClientError> {
        self.request(endpoint, RequestOptions::post(body)).await
    }

    /// Sends a call through the pipeline.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> Result<Response, ClientError> {
        let url = self.url(endpoint)?;
        let body = options.body.as_ref().map(serde_json::to_vec).transpose()?;

        let mut retry = RetryState::new(self.retry);

        loop {
            if options.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
                return Err(ClientError::Cancelled {
                    attempts: retry.attempts(),
                });
            }

            let attempt_timeout = match options.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());

                    if remaining.is_zero() {
                        return Err(ClientError::DeadlineExceeded {
                            attempts: retry.attempts(),
                        });
                    }

                    self.attempt_timeout.min(remaining)
                }
                None => self.attempt_timeout,
            };

            if let Err(retry_after) = self.throttle.try_acquire() {
                telemetry::metrics::record_client_attempt("throttled");

                return Err(ClientError::RateLimitedLocally {
                    limit: self.throttle.limit(),
                    window: self.throttle.window(),
                    retry_after,
                });
            }

            let request = TransportRequest {
                method: options.method.clone(),
                url: url.clone(),
                headers: self.headers(&options, body.is_some())?,
                body: body.clone(),
            };

            retry.record_attempt();

            let send = tokio::time::timeout(attempt_timeout, self.transport.send(request));

            let sent = match &options.cancellation {
                Some(token) => tokio::select! {
                    sent = send => sent,
                    () = token.cancelled() => {
                        return Err(ClientError::Cancelled { attempts: retry.attempts() });
                    }
                },
                None => send.await,
            };

            let attempt = match sent {
                Ok(Ok(response)) => self.classify(response),
                Ok(Err(TransportError::InvalidRequest(message))) => Attempt::Terminal(ClientError::InvalidRequest(message)),
                Ok(Err(TransportError::Network(reason))) => Attempt::Retryable { reason, status: None },
                Err(_) if options.deadline.is_some_and(|deadline| Instant::now() >= deadline) => {
                    telemetry::metrics::record_client_attempt("deadline");

                    return Err(ClientError::DeadlineExceeded {
                        attempts: retry.attempts(),
                    });
                }
                Err(_) => Attempt::Retryable {
                    reason: format!("no response within {attempt_timeout:?}"),
                    status: None,
                },
            };

            let (reason, status) = match attempt {
                Attempt::Success(response) => {
                    telemetry::metrics::record_client_attempt("success");
                    return Ok(response);
                }
                Attempt::Terminal(error) => {
                    telemetry::metrics::record_client_attempt("rejected");
                    return Err(error);
                }
                Attempt::Retryable { reason, status } => {
                    telemetry::metrics::record_client_attempt("retryable");
                    (reason, status)
                }
            };

            let Some(mut delay) = retry.next_delay() else {
                return Err(ClientError::Transient {
                    attempts: retry.attempts(),
                    reason,
                    status,
                });
            };

            if let Some(deadline) = options.deadline {
                delay = delay.min(deadline.saturating_duration_since(Instant::now()));
            }

            log::debug!(
                "{} {url} failed ({reason}), attempt {} of {}, retrying in {delay:?}",
                options.method,
                retry.attempts(),
                self.retry.max_attempts(),
            );

            match &options.cancellation {
                Some(token) => tokio::select! {
                    () = tokio::time::sleep(delay) => (),
                    () = token.cancelled() => {
                        return Err(ClientError::Cancelled { attempts: retry.attempts() });
                    }
                },
                None => tokio::time::sleep(delay).await,
            }
        }
    }

    fn url(&self, endpoint: &str) -> Result<Url, ClientError> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Url::parse(endpoint).map_err(|e| ClientError::InvalidRequest(e.to_string()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let endpoint = endpoint.trim_start_matches('/');

        Url::parse(&format!("{base}/{endpoint}")).map_err(|e| ClientError::InvalidRequest(e.to_string()))
    }

    fn headers(&self, options: &RequestOptions, has_body: bool) -> Result<HeaderMap, ClientError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        if has_body {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if options.requires_auth {
            let authorization = self.credentials.authorization().ok_or(ClientError::AuthRequired)?;
            headers.insert(AUTHORIZATION, authorization);
        }

        Ok(headers)
    }

    fn classify(&self, response: TransportResponse) -> Attempt {
        let TransportResponse { status, headers, body } = response;

        if status.is_success() {
            return Attempt::Success(Response { status, headers, body });
        }

        if status.is_server_error() {
            return Attempt::Retryable {
                reason: format!("server responded with {status}"),
                status: Some(status),
            };
        }

        let error_body: ErrorBody = serde_json::from_slice(&body).unwrap_or_default();
        let retry_after = retry_after_header(&headers)
            .or(error_body.retry_after)
            .map(Duration::from_secs);

        let error = match status {
            StatusCode::UNAUTHORIZED => {
                if self.credentials.clear() {
                    log::debug!("Server rejected the stored credentials, cleared them");
                }

                ClientError::AuthExpired {
                    message: error_body.error,
                }
            }
            StatusCode::FORBIDDEN => ClientError::Forbidden {
                message: error_body.error,
                retry_after,
            },
            StatusCode::TOO_MANY_REQUESTS => {
                log::debug!("Server rate limited the call, retry after {retry_after:?}");

                ClientError::RateLimited {
                    message: error_body.error,
                    retry_after,
                }
            }
            status => ClientError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            },
        };

        Attempt::Terminal(error)
    }
}

fn retry_after_header(headers: &HeaderMap) -> Option<u64> {
    headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse().ok()
}
