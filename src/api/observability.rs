use axum::{
    extract::{MatchedPath, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// GET /metrics
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    )
}

/// Wraps each request in a span, records HTTP metrics and emits one
/// `http_request_finished` event per request.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    // Reuse the caller's id when a proxy already assigned one
    let request_id = req
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|id| !id.is_empty() && id.len() <= 64)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string());

    let user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        route = route.as_deref(),
        user_id = tracing::field::Empty,
    );

    async move {
        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let status = response.status().as_u16();

        // Route templates keep label cardinality bounded
        let labels = [
            ("method", method),
            ("path", route.unwrap_or_else(|| "unmatched".to_string())),
            ("status", status.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(elapsed.as_secs_f64());

        if status >= 500 {
            warn!(
                event = "http_request_finished",
                duration_ms,
                status_code = status,
                user_agent = %user_agent,
                outcome = "error",
                "Request failed"
            );
        } else {
            let outcome = if status >= 400 { "client_error" } else { "success" };
            info!(
                event = "http_request_finished",
                duration_ms,
                status_code = status,
                user_agent = %user_agent,
                outcome,
                "Request finished"
            );
        }

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert("referrer-policy", HeaderValue::from_static("no-referrer"));
    // The API only serves JSON and downloads, never documents
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
    );

    response
}
