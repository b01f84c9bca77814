use axum::{
    body::Body,
    extract::ConnectInfo,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::ip::{extract_ip, rate_limit_headers};
use crate::error::AppError;
use crate::state::AppState;

/// Per-IP rate limiting applied ahead of every route. Unlike staff/student
/// auth, this runs before the principal is known, so the key is the client
/// IP rather than an account id.
pub async fn general_rate_limit(
    axum::extract::State(state): axum::extract::State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let peer_ip = request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());
    let ip = extract_ip(request.headers(), peer_ip.as_deref());

    let rl = state.ip_rate_limiter.check_and_increment(ip);
    if !rl.allowed {
        return AppError::rate_limited(&rl).into_response();
    }

    let mut response = next.run(request).await;
    if !response.headers().contains_key("x-ratelimit-limit") {
        response.headers_mut().extend(rate_limit_headers(&rl));
    }
    response
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, body::Body, http::Request, middleware, routing::get};
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    use super::*;
    use crate::rate_limit::IpRateLimiter;

    async fn hello() -> Json<serde_json::Value> {
        Json(json!({ "msg": "hello" }))
    }

    fn make_app(state: AppState) -> Router {
        Router::new()
            .route("/hello", get(hello))
            .layer(middleware::from_fn_with_state(state.clone(), general_rate_limit))
            .with_state(state)
    }

    fn test_state(limit: u32) -> AppState {
        let mut state = crate::routes::test_helpers::fake_state();
        state.ip_rate_limiter = std::sync::Arc::new(IpRateLimiter::new(limit, 60));
        state
    }

    #[tokio::test]
    async fn adds_headers_on_success() {
        let app = make_app(test_state(60));
        let resp = app
            .oneshot(Request::builder().uri("/hello").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
        assert!(resp.headers().contains_key("x-ratelimit-limit"));
    }

    #[tokio::test]
    async fn returns_429_after_exceeding_limit() {
        let app = make_app(test_state(1));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/hello")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/hello")
                    .header("x-forwarded-for", "203.0.113.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::TOO_MANY_REQUESTS);
        assert!(resp.headers().contains_key("retry-after"));
    }

    #[tokio::test]
    async fn different_ips_are_independent() {
        let app = make_app(test_state(1));

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/hello")
                    .header("x-forwarded-for", "198.51.100.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/hello")
                    .header("x-forwarded-for", "198.51.100.2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), axum::http::StatusCode::OK);
    }
}
