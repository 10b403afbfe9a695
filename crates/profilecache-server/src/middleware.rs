use std::time::{Duration, Instant};

use axum::{
    Json,
    body::Body,
    extract::{MatchedPath, State},
    http::{HeaderName, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = match req.headers().get(&header_name) {
        Some(v) => v.clone(),
        None => HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;

    // Add/propagate the request id header to response
    res.headers_mut().insert(header_name, req_id_value);

    res
}

/// Fails requests that outlive `deadline` with 408.
pub async fn request_timeout(
    State(deadline): State<Duration>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    match tokio::time::timeout(deadline, next.run(req)).await {
        Ok(res) => res,
        Err(_) => {
            tracing::warn!(path = %path, timeout_ms = deadline.as_millis() as u64, "Request timed out");
            (
                StatusCode::REQUEST_TIMEOUT,
                Json(json!({ "error": "Request timed out" })),
            )
                .into_response()
        }
    }
}

/// Records request count and latency labelled by the matched route template,
/// so subjects in paths never become label values.
pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let res = next.run(req).await;

    crate::metrics::record_http_request(&method, &route, res.status().as_u16(), start.elapsed());
    res
}
