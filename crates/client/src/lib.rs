//! Outbound request pipeline for services protected by turnstile.
//!
//! Every call goes through a local self-throttle, attaches credentials, and is classified
//! by its outcome: authentication and admission failures are returned immediately, network
//! failures and server errors are retried with linear backoff.

#![deny(missing_docs)]

mod client;
mod credentials;
mod error;
mod retry;
mod throttle;
mod transport;

pub use client::{Client, RequestOptions, Response};
pub use credentials::Credentials;
pub use error::{ClientError, TransportError};
pub use retry::RetryPolicy;
pub use throttle::ClientThrottleWindow;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
