//! Metrics tracking middleware
//!
//! Tracks request latency, counts, and status codes for Prometheus metrics
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Label used for requests that matched no route
const UNMATCHED: &str = "unmatched";

/// Metrics tracking middleware
///
/// Records:
/// - Request count per endpoint
/// - Request latency distribution
/// - Response status codes
pub async fn metrics_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let endpoint = endpoint_label(
        request.method().as_str(),
        request.extensions().get::<MatchedPath>().map(|p| p.as_str()),
    );

    let response = next.run(request).await;

    let latency_us = start.elapsed().as_micros() as u64;
    state
        .record_request(endpoint, response.status().as_u16(), latency_us)
        .await;

    response
}

/// Label a request by method and route template.
///
/// Raw URIs are never used so that query strings (user ids, admin keys)
/// stay out of the metrics and the label set stays bounded.
fn endpoint_label(method: &str, matched: Option<&str>) -> String {
    format!("{} {}", method, matched.unwrap_or(UNMATCHED))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_label() {
        assert_eq!(endpoint_label("POST", Some("/upload")), "POST /upload");
        assert_eq!(endpoint_label("GET", None), "GET unmatched");
    }
}
