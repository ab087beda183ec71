//! Startup self-test
//!
//! Before the listeners accept traffic, a receive-only probe subscribes to the
//! self-test stream through the in-process router, follows the advertised
//! layer-event link and waits for ICE to connect. A host whose media ports
//! are unreachable fails here instead of silently serving broken sessions.

use axum::{
    body::Body,
    http::{header::AUTHORIZATION, header::CONTENT_TYPE, header::LINK, Method, Request, StatusCode},
    Router,
};
use relaybox_webrtc::{EngineConfig, ProbeClient};
use std::fmt;
use std::time::{Duration, Instant};
use tower::ServiceExt;

use crate::api::whep::SSE_REL;
use crate::api::SDP_CONTENT_TYPE;
use crate::config::SelfTestConfig;

const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum SelfTestError {
    /// The probe peer connection could not be set up locally
    #[error("probe setup failed: {0}")]
    Probe(#[source] relaybox_webrtc::Error),

    #[error("request to {path} failed: {message}")]
    Request { path: String, message: String },

    #[error("{path} returned {status}: {body}")]
    UnexpectedStatus {
        path: String,
        status: StatusCode,
        body: String,
    },

    #[error("WHEP answer did not advertise a layer event link")]
    MissingLink,

    #[error("layer event stream did not start with a layers event: {0:?}")]
    BadEventStream(String),

    #[error("media connection failed: {0}")]
    Connection(#[source] relaybox_webrtc::Error),

    #[error("self-test did not finish within {0:?}")]
    Timeout(Duration),
}

/// Result of a self-test run
#[derive(Debug)]
pub enum SelfTestOutcome {
    /// ICE connected after the given time
    Passed(Duration),
    /// The gateway or network did not behave as a viewer needs
    Failed(SelfTestError),
    /// The self-test could not run at all
    Error(SelfTestError),
}

impl SelfTestOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, SelfTestOutcome::Passed(_))
    }
}

impl fmt::Display for SelfTestOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfTestOutcome::Passed(elapsed) => write!(f, "passed in {:?}", elapsed),
            SelfTestOutcome::Failed(e) => write!(f, "failed: {}", e),
            SelfTestOutcome::Error(e) => write!(f, "could not run: {}", e),
        }
    }
}

/// Run the self-test against `router`
pub async fn run(router: Router, engine: &EngineConfig, config: &SelfTestConfig) -> SelfTestOutcome {
    let started = Instant::now();
    let timeout = config.timeout();

    match tokio::time::timeout(timeout, probe(router, engine, config)).await {
        Ok(Ok(())) => SelfTestOutcome::Passed(started.elapsed()),
        Ok(Err(e @ SelfTestError::Probe(_))) => SelfTestOutcome::Error(e),
        Ok(Err(e)) => SelfTestOutcome::Failed(e),
        Err(_) => SelfTestOutcome::Failed(SelfTestError::Timeout(timeout)),
    }
}

async fn probe(
    router: Router,
    engine: &EngineConfig,
    config: &SelfTestConfig,
) -> Result<(), SelfTestError> {
    let probe = ProbeClient::new(engine).await.map_err(SelfTestError::Probe)?;
    let result = exchange(&probe, router, config).await;
    probe.close().await;
    result
}

async fn exchange(
    probe: &ProbeClient,
    router: Router,
    config: &SelfTestConfig,
) -> Result<(), SelfTestError> {
    let offer = probe.create_offer().await.map_err(SelfTestError::Probe)?;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/whep")
        .header(AUTHORIZATION, format!("Bearer {}", config.stream_key))
        .header(CONTENT_TYPE, SDP_CONTENT_TYPE)
        .body(Body::from(offer))
        .map_err(|e| request_error("/api/whep", e))?;

    let (status, headers, body) = send(router.clone(), request).await?;
    if status != StatusCode::CREATED {
        return Err(SelfTestError::UnexpectedStatus {
            path: "/api/whep".to_string(),
            status,
            body,
        });
    }

    let sse_path = headers
        .get_all(LINK)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|link| link_target(link, SSE_REL))
        .ok_or(SelfTestError::MissingLink)?;

    let request = Request::builder()
        .uri(&sse_path)
        .body(Body::empty())
        .map_err(|e| request_error(&sse_path, e))?;

    let (status, _, events) = send(router, request).await?;
    if status != StatusCode::OK {
        return Err(SelfTestError::UnexpectedStatus {
            path: sse_path,
            status,
            body: events,
        });
    }
    if !events.starts_with("event: layers\n") {
        return Err(SelfTestError::BadEventStream(events));
    }

    probe
        .apply_answer(body)
        .await
        .map_err(SelfTestError::Connection)?;

    probe
        .wait_connected(config.timeout())
        .await
        .map_err(SelfTestError::Connection)
}

async fn send(
    router: Router,
    request: Request<Body>,
) -> Result<(StatusCode, axum::http::HeaderMap, String), SelfTestError> {
    let path = request.uri().path().to_string();

    let response = router
        .oneshot(request)
        .await
        .map_err(|e| request_error(&path, e))?;

    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
        .await
        .map_err(|e| request_error(&path, e))?;

    Ok((status, headers, String::from_utf8_lossy(&bytes).into_owned()))
}

fn request_error(path: &str, e: impl fmt::Display) -> SelfTestError {
    SelfTestError::Request {
        path: path.to_string(),
        message: e.to_string(),
    }
}

/// Target of a `Link` header value when its `rel` matches
fn link_target(link: &str, rel: &str) -> Option<String> {
    let rel_param = format!(r#"rel="{}""#, rel);
    if !link.split(';').any(|param| param.trim() == rel_param) {
        return None;
    }
    let start = link.find('<')? + 1;
    let end = link[start..].find('>')? + start;
    Some(link[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::whep::session_links;
    use axum::routing::{get, post};

    fn config() -> SelfTestConfig {
        SelfTestConfig {
            enabled: true,
            timeout_seconds: 5,
            ..SelfTestConfig::default()
        }
    }

    #[tokio::test]
    async fn test_rejected_offer_fails() {
        let router = Router::new().route(
            "/api/whep",
            post(|| async { (StatusCode::BAD_REQUEST, "negotiation failed") }),
        );

        let outcome = run(router, &EngineConfig::host_only(), &config()).await;

        match outcome {
            SelfTestOutcome::Failed(SelfTestError::UnexpectedStatus { path, status, body }) => {
                assert_eq!(path, "/api/whep");
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, "negotiation failed");
            }
            other => panic!("unexpected outcome: {}", other),
        }
    }

    #[tokio::test]
    async fn test_answer_without_links_fails() {
        let router = Router::new().route(
            "/api/whep",
            post(|| async { (StatusCode::CREATED, "v=0\r\n") }),
        );

        let outcome = run(router, &EngineConfig::host_only(), &config()).await;
        assert!(matches!(
            outcome,
            SelfTestOutcome::Failed(SelfTestError::MissingLink)
        ));
    }

    #[tokio::test]
    async fn test_bad_event_stream_fails() {
        let [sse, _] = session_links("/api/", "abc");
        let router = Router::new()
            .route(
                "/api/whep",
                post(move || {
                    let sse = sse.clone();
                    async move { (StatusCode::CREATED, [(LINK, sse)], "v=0\r\n") }
                }),
            )
            .route("/api/sse/abc", get(|| async { "event: nope\n\n" }));

        let outcome = run(router, &EngineConfig::host_only(), &config()).await;
        assert!(matches!(
            outcome,
            SelfTestOutcome::Failed(SelfTestError::BadEventStream(events)) if events == "event: nope\n\n"
        ));
    }

    #[test]
    fn test_link_target_matches_rel() {
        let [sse, layer] = session_links("/api/", "abc");
        assert_eq!(link_target(&sse, SSE_REL).as_deref(), Some("/api/sse/abc"));
        assert_eq!(link_target(&layer, SSE_REL), None);
    }

    #[test]
    fn test_link_target_rejects_malformed() {
        assert_eq!(link_target(r#"/api/sse/abc; rel="x""#, "x"), None);
    }

    #[test]
    fn test_outcome_display() {
        let outcome = SelfTestOutcome::Failed(SelfTestError::MissingLink);
        assert!(!outcome.is_pass());
        assert_eq!(
            outcome.to_string(),
            "failed: WHEP answer did not advertise a layer event link"
        );
        assert!(SelfTestOutcome::Passed(Duration::from_millis(5)).is_pass());
    }
}
