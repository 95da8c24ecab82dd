//! Rate limiting middleware.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;

use common::AppError;

use crate::state::AppState;

/// Per path and client IP, failing closed when the cache is unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let max_requests = state.config.rate_limit.max_requests;
    let window_seconds = state.config.rate_limit.window_seconds;

    let ip = get_client_ip(&request, connect_info);
    let identifier = format!("{}:{}", request.uri().path(), ip);

    let count = match state
        .cache
        .check_rate_limit(&identifier, max_requests, window_seconds)
        .await
    {
        Ok((count, true)) => count,
        Ok((_, false)) => return rate_limit_exceeded_response(max_requests, window_seconds),
        Err(e) => {
            tracing::warn!(error = %e, "Rate limit check failed, rejecting request");
            return rate_limit_exceeded_response(max_requests, window_seconds);
        }
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(max_requests));
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from(max_requests.saturating_sub(count)),
    );

    response
}

fn get_client_ip(request: &Request<Body>, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    // Try X-Forwarded-For header first
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(ip) = forwarded.split(',').next() {
            return ip.trim().to_string();
        }
    }

    if let Some(real_ip) = request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
    {
        return real_ip.to_string();
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn rate_limit_exceeded_response(max_requests: u64, window_seconds: u64) -> Response {
    let mut response = AppError::TooManyRequests.into_response();

    let headers = response.headers_mut();
    headers.insert("Retry-After", HeaderValue::from(window_seconds));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    headers.insert("X-RateLimit-Limit", HeaderValue::from(max_requests));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .header("X-Real-IP", "10.0.0.2")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_client_ip(&request, None), "203.0.113.7");
    }

    #[test]
    fn test_client_ip_falls_back_to_socket() {
        let request = Request::builder().body(Body::empty()).unwrap();
        let addr: SocketAddr = "192.0.2.10:5000".parse().unwrap();
        assert_eq!(get_client_ip(&request, Some(ConnectInfo(addr))), "192.0.2.10");
        assert_eq!(get_client_ip(&request, None), "unknown");
    }
}
