use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use realmgate_core::TakeOutcome;

use crate::error::AppError;
use crate::state::AppState;

const LIMIT_HEADER: &str = "x-ratelimit-limit";
const REMAINING_HEADER: &str = "x-ratelimit-remaining";
const RESET_HEADER: &str = "x-ratelimit-reset";

/// Clients are keyed by peer IP; requests without connection info share one
/// bucket.
fn client_key(req: &Request) -> String {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "anonymous".to_string())
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn set_headers(headers: &mut HeaderMap, outcome: &TakeOutcome) {
    headers.insert(LIMIT_HEADER, HeaderValue::from(outcome.limit));
    headers.insert(REMAINING_HEADER, HeaderValue::from(outcome.remaining));
    headers.insert(RESET_HEADER, HeaderValue::from(unix_seconds(outcome.reset)));
}

/// Takes one token per request from the shared store. A limit of zero means
/// the store does not count, and no headers are added.
pub async fn rate_limit(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let key = client_key(&req);

    let outcome = match state.limiter.take(&key).await {
        Ok(outcome) => outcome,
        Err(e) => return AppError::from(e).into_response(),
    };

    if !outcome.allowed {
        tracing::warn!("Rate limit exceeded for {key}");
        let retry_after = outcome
            .reset
            .duration_since(SystemTime::now())
            .map(|d| d.as_secs().max(1))
            .unwrap_or(1);
        let mut response = (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
        set_headers(response.headers_mut(), &outcome);
        response
            .headers_mut()
            .insert(axum::http::header::RETRY_AFTER, HeaderValue::from(retry_after));
        return response;
    }

    let mut response = next.run(req).await;
    if outcome.limit > 0 {
        set_headers(response.headers_mut(), &outcome);
    }
    response
}
