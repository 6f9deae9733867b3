use axum::{
    Json,
    body::Body,
    response::{IntoResponse, Response},
};
use http::{HeaderMap, HeaderValue, StatusCode, header::RETRY_AFTER};
use jiff::Timestamp;
use rate_limit::{Quota, Rejection};
use serde::Serialize;

const LIMIT: &str = "x-ratelimit-limit";
const REMAINING: &str = "x-ratelimit-remaining";
const RESET: &str = "x-ratelimit-reset";

/// Body of a 429 response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectionBody {
    error: String,
    retry_after: u64,
    tier: String,
    reset_time: String,
    remaining: u32,
    limit: u32,
}

/// Unix timestamp, in seconds, at which the quota's window resets.
fn reset_at(quota: &Quota) -> Timestamp {
    let now = Timestamp::now();
    let reset = now.as_second().saturating_add_unsigned(quota.reset_after_secs());

    Timestamp::from_second(reset).unwrap_or(now)
}

pub(super) fn insert_quota_headers(headers: &mut HeaderMap, quota: &Quota) {
    headers.insert(LIMIT, HeaderValue::from(quota.limit));
    headers.insert(REMAINING, HeaderValue::from(quota.remaining));
    headers.insert(RESET, HeaderValue::from(reset_at(quota).as_second()));
}

pub(super) fn rejected(rejection: &Rejection) -> Response<Body> {
    let quota = &rejection.quota;
    let retry_after = rejection.retry_after_secs();

    let body = RejectionBody {
        error: rejection.message(),
        retry_after,
        tier: quota.label.clone(),
        reset_time: reset_at(quota).to_string(),
        remaining: 0,
        limit: quota.limit,
    };

    let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
    let headers = response.headers_mut();

    insert_quota_headers(headers, quota);
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));

    response
}
