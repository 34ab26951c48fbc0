//! Security headers middleware.

use axum::{
    body::Body,
    http::{header::HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Security headers middleware.
///
/// Adds the following headers to all responses:
/// - X-Content-Type-Options: nosniff (shared files are served inline with the
///   uploader's declared type)
/// - X-Frame-Options: DENY
/// - Referrer-Policy: no-referrer (share links must not leak to third parties)
/// - X-XSS-Protection: 0
///
/// Note: Strict-Transport-Security should be set at the reverse proxy level
/// as it requires HTTPS.
pub async fn security_headers(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Prevent MIME type sniffing
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );

    // Prevent clickjacking
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));

    headers.insert("X-XSS-Protection", HeaderValue::from_static("0"));

    // Signed redirects expire, so nothing is cacheable by default
    if !headers.contains_key("Cache-Control") {
        headers.insert(
            "Cache-Control",
            HeaderValue::from_static("no-store, max-age=0"),
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, routing::get, Router};
    use tower::util::ServiceExt;

    async fn dummy_handler() -> &'static str {
        "OK"
    }

    #[tokio::test]
    async fn test_security_headers_added() {
        use axum::middleware;

        let app = Router::new()
            .route("/", get(dummy_handler))
            .layer(middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
        assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
        assert_eq!(headers.get("Referrer-Policy").unwrap(), "no-referrer");
        assert_eq!(headers.get("X-XSS-Protection").unwrap(), "0");
        assert_eq!(headers.get("Cache-Control").unwrap(), "no-store, max-age=0");
    }

    #[tokio::test]
    async fn test_existing_cache_control_kept() {
        use axum::middleware;

        async fn cached() -> ([(&'static str, &'static str); 1], &'static str) {
            ([("Cache-Control", "public, max-age=60")], "OK")
        }

        let app = Router::new()
            .route("/", get(cached))
            .layer(middleware::from_fn(security_headers));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("Cache-Control").unwrap(),
            "public, max-age=60"
        );
    }
}
