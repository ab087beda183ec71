//! Plain HTTP listener that sends every request to its HTTPS equivalent

use axum::{
    http::{header::HOST, header::LOCATION, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};

/// `https://` URL for a request received over plain HTTP
///
/// The host is kept exactly as the client sent it.
pub fn https_location(host: &str, uri: &Uri) -> String {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    format!("https://{}{}", host, path_and_query)
}

async fn redirect_to_https(headers: HeaderMap, uri: Uri) -> Response {
    let host = headers
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.authority().map(|a| a.as_str()));

    match host {
        Some(host) => (
            StatusCode::MOVED_PERMANENTLY,
            [(LOCATION, https_location(host, &uri))],
        )
            .into_response(),
        None => (StatusCode::BAD_REQUEST, "Missing Host header").into_response(),
    }
}

/// Router answering every path and method with a 301 to HTTPS
pub fn redirect_router() -> Router {
    Router::new().fallback(redirect_to_https)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[test]
    fn test_https_location_keeps_path_and_query() {
        let uri: Uri = "/watch/studio?muted=1".parse().unwrap();
        assert_eq!(
            https_location("relay.example.com", &uri),
            "https://relay.example.com/watch/studio?muted=1"
        );
    }

    #[tokio::test]
    async fn test_redirect_router_sends_301() {
        let request = Request::builder()
            .uri("/api/status")
            .header(HOST, "relay.example.com")
            .body(Body::empty())
            .unwrap();

        let response = redirect_router().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(
            response.headers()[LOCATION],
            "https://relay.example.com/api/status"
        );
    }

    #[tokio::test]
    async fn test_redirect_without_host_is_rejected() {
        let request = Request::builder()
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let response = redirect_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
