use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::observability::get_metrics;

/// Records request count and latency per route template.
///
/// Labels use the matched route (`/payments/verify/:reference`) rather than
/// the raw URI so references never become label values.
pub async fn track_http_metrics(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    get_metrics().record_http_request(
        &method,
        &path,
        response.status().as_u16(),
        start.elapsed().as_secs_f64() * 1000.0,
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_passes_response_through() {
        let app = Router::new()
            .route("/items/:id", get(|| async { (StatusCode::ACCEPTED, "queued") }))
            .layer(middleware::from_fn(track_http_metrics));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/items/TIX_ABC")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_unmatched_route_still_answers() {
        let app = Router::new()
            .route("/items/:id", get(|| async { "ok" }))
            .layer(middleware::from_fn(track_http_metrics));

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/nowhere")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
