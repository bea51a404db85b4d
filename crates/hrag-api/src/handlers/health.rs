//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::Arc;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub name: String,
}

/// Liveness check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
    })
}

/// Readiness response
#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub checks: ReadinessChecks,
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessChecks {
    /// Counter store answered a ping
    pub counter_store: bool,
    /// Vector store answered a health check
    pub vector_store_ok: bool,
    pub vector_store: String,
    pub llm: String,
    pub ocr_enabled: bool,
}

/// Readiness check over the counter store and the vector store
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let counter_store = match state.quota.store().ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Counter store ping failed: {e}");
            false
        }
    };
    let vector_store_ok = match state.store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(backend = state.store.name(), "Vector store health check failed: {e}");
            false
        }
    };
    let ready = counter_store && vector_store_ok;

    let response = ReadinessResponse {
        ready,
        checks: ReadinessChecks {
            counter_store,
            vector_store_ok,
            vector_store: state.store.name().to_string(),
            llm: state.agent.llm_name().to_string(),
            ocr_enabled: state.ingest.ocr_enabled(),
        },
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Prometheus-compatible metrics endpoint
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Prometheus text exposition", content_type = "text/plain")
    )
)]
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let uptime = state.uptime_secs();
    let total_requests = state.get_request_count();
    let (cache_hits, cache_misses) = state.get_cache_stats();

    let mut output = String::new();

    gauge(&mut output, "hrag_uptime_seconds", "Time since server start", uptime);
    counter(
        &mut output,
        "hrag_requests_total",
        "Total number of HTTP requests",
        total_requests,
    );
    let _ = writeln!(output, "# HELP hrag_build_info Build information");
    let _ = writeln!(output, "# TYPE hrag_build_info gauge");
    let _ = writeln!(
        output,
        "hrag_build_info{{version=\"{}\"}} 1\n",
        env!("CARGO_PKG_VERSION")
    );

    counter(
        &mut output,
        "hrag_embedding_cache_hits_total",
        "Query embedding cache hits",
        cache_hits,
    );
    counter(
        &mut output,
        "hrag_embedding_cache_misses_total",
        "Query embedding cache misses",
        cache_misses,
    );

    let metrics = state.metrics.read().await;
    let mut endpoints: Vec<_> = metrics.iter().collect();
    endpoints.sort_by(|a, b| a.0.cmp(b.0));

    // Request counts by endpoint and status
    let _ = writeln!(
        output,
        "# HELP hrag_http_requests_total HTTP requests by endpoint and status"
    );
    let _ = writeln!(output, "# TYPE hrag_http_requests_total counter");
    for (endpoint, endpoint_metrics) in &endpoints {
        let mut statuses: Vec<_> = endpoint_metrics.status_counts.iter().collect();
        statuses.sort();
        for (status, count) in statuses {
            let _ = writeln!(
                output,
                "hrag_http_requests_total{{endpoint=\"{endpoint}\",status=\"{status}\"}} {count}"
            );
        }
    }
    output.push('\n');

    // Request latency histogram
    let _ = writeln!(
        output,
        "# HELP hrag_http_request_duration_seconds HTTP request latency"
    );
    let _ = writeln!(output, "# TYPE hrag_http_request_duration_seconds histogram");
    for (endpoint, m) in &endpoints {
        if m.latency_count == 0 {
            continue;
        }

        let mut cumulative = 0u64;
        for (le, count) in [
            ("0.01", m.latency_buckets.under_10ms),
            ("0.05", m.latency_buckets.ms_10_50),
            ("0.1", m.latency_buckets.ms_50_100),
            ("0.5", m.latency_buckets.ms_100_500),
            ("1.0", m.latency_buckets.ms_500_1000),
            ("+Inf", m.latency_buckets.over_1s),
        ] {
            cumulative += count;
            let _ = writeln!(
                output,
                "hrag_http_request_duration_seconds_bucket{{endpoint=\"{endpoint}\",le=\"{le}\"}} {cumulative}"
            );
        }

        let _ = writeln!(
            output,
            "hrag_http_request_duration_seconds_sum{{endpoint=\"{endpoint}\"}} {:.6}",
            m.total_latency_us as f64 / 1_000_000.0
        );
        let _ = writeln!(
            output,
            "hrag_http_request_duration_seconds_count{{endpoint=\"{endpoint}\"}} {}",
            m.latency_count
        );
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

fn gauge(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = write!(output, "# HELP {name} {help}\n# TYPE {name} gauge\n{name} {value}\n\n");
}

fn counter(output: &mut String, name: &str, help: &str, value: u64) {
    let _ = write!(output, "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n\n");
}
