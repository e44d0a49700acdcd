//! API Middleware (Rate Limiting, Logging)

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use super::handlers::AppState;
use super::types::{ApiError, ApiResponse};
use crate::core::rate_limit::now_ms;

/// Identity for rate limiting: API key, then forwarded IP
pub fn rate_limit_identity(headers: &HeaderMap) -> String {
    headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .map(|key| format!("key:{}", key))
        .unwrap_or_else(|| {
            let ip = headers
                .get("X-Forwarded-For")
                .or_else(|| headers.get("x-real-ip"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or("unknown");
            format!("ip:{}", ip)
        })
}

/// Fixed-window rate limiting middleware
pub async fn rate_limit_middleware(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    // Health probes are never limited
    let path = request.uri().path();
    if path == "/health" || path == "/v1/health" {
        return next.run(request).await;
    }

    let identity = rate_limit_identity(request.headers());
    let decision = state.limiter.check_rate_limit(&identity).await;
    let reset_secs = decision.reset_at_ms / 1000;

    if !decision.allowed {
        state.gate.record_rate_limited(&identity);
        let retry_after = decision.retry_after_secs(now_ms());
        let body = ApiResponse::error(ApiError::rate_limited(retry_after), 0.0);

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("Retry-After", HeaderValue::from(retry_after));
        headers.insert("X-RateLimit-Remaining", HeaderValue::from(0u32));
        headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_secs));
        return response;
    }

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(reset_secs));

    response
}

/// Request logging middleware; tags each response with `X-Request-Id`
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let mut response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("X-Request-Id", value);
    }

    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_prefers_api_key() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Forwarded-For", HeaderValue::from_static("10.0.0.1, 10.0.0.2"));
        assert_eq!(rate_limit_identity(&headers), "ip:10.0.0.1");

        headers.insert("X-API-Key", HeaderValue::from_static("pk_live"));
        assert_eq!(rate_limit_identity(&headers), "key:pk_live");
    }

    #[test]
    fn test_identity_fallback() {
        let mut headers = HeaderMap::new();
        assert_eq!(rate_limit_identity(&headers), "ip:unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("192.168.1.7"));
        assert_eq!(rate_limit_identity(&headers), "ip:192.168.1.7");
    }
}
