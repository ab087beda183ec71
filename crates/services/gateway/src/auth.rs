//! Bearer token parsing and WHIP/WHEP authorization
//!
//! WHIP publishers send `Authorization: Bearer <streamKey>;<authToken>`.
//! WHEP viewers send `Authorization: Bearer <streamKey>`; the stream key alone
//! addresses a public broadcast.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use relaybox_core::validate_stream_key;
use relaybox_credential_store::{CredentialStore, Streamer};

use crate::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Split a `Bearer` authorization value into its `;`-separated components
///
/// Returns `None` when the value does not start with `Bearer `. The
/// components are not validated.
pub fn extract_bearer_token(header: &str) -> Option<Vec<&str>> {
    header
        .strip_prefix(BEARER_PREFIX)
        .map(|token| token.split(';').collect())
}

fn authorization_header(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers.get(AUTHORIZATION).ok_or(ApiError::AuthMissing)?;
    let value = value
        .to_str()
        .map_err(|_| ApiError::AuthMalformed("header is not valid ASCII".to_string()))?;

    if value.is_empty() {
        return Err(ApiError::AuthMissing);
    }
    Ok(value)
}

/// Stream key and auth token presented by a WHIP publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishToken {
    pub stream_key: String,
    pub auth_token: String,
}

/// Parse and syntax-check a WHIP authorization header
pub fn publish_token(headers: &HeaderMap) -> Result<PublishToken, ApiError> {
    let value = authorization_header(headers)?;
    let parts = extract_bearer_token(value)
        .ok_or_else(|| ApiError::AuthMalformed("expected a Bearer token".to_string()))?;

    let [stream_key, auth_token] = parts.as_slice() else {
        return Err(ApiError::AuthMalformed(
            "expected <streamKey>;<authToken>".to_string(),
        ));
    };

    if !validate_stream_key(stream_key) {
        return Err(ApiError::AuthMalformed("invalid stream key".to_string()));
    }

    Ok(PublishToken {
        stream_key: stream_key.to_string(),
        auth_token: auth_token.to_string(),
    })
}

/// Parse a WHEP authorization header down to its stream key
///
/// Anything after the first `;` is ignored.
pub fn view_stream_key(headers: &HeaderMap) -> Result<String, ApiError> {
    let value = authorization_header(headers)?;
    let parts = extract_bearer_token(value)
        .ok_or_else(|| ApiError::AuthMalformed("expected a Bearer token".to_string()))?;

    match parts.first() {
        Some(stream_key) if validate_stream_key(stream_key) => Ok(stream_key.to_string()),
        _ => Err(ApiError::AuthMalformed("invalid stream key".to_string())),
    }
}

/// Full WHIP credential check against the store
///
/// A store failure is returned as [`ApiError::Store`], never as
/// [`ApiError::Unauthorized`].
pub async fn authorize_publisher(
    store: &dyn CredentialStore,
    headers: &HeaderMap,
) -> Result<Streamer, ApiError> {
    let token = publish_token(headers)?;

    store
        .find_streamer(&token.stream_key, &token.auth_token)
        .await?
        .ok_or(ApiError::Unauthorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer a;b"), Some(vec!["a", "b"]));
        assert_eq!(extract_bearer_token("Bearer studio"), Some(vec!["studio"]));
        assert_eq!(extract_bearer_token("Bearer "), Some(vec![""]));
        assert_eq!(extract_bearer_token("Basic x"), None);
        assert_eq!(extract_bearer_token("bearer a;b"), None);
    }

    #[test]
    fn test_publish_token() {
        let token = publish_token(&headers("Bearer studio;s3cret")).unwrap();
        assert_eq!(token.stream_key, "studio");
        assert_eq!(token.auth_token, "s3cret");
    }

    #[test]
    fn test_publish_token_requires_two_components() {
        assert!(matches!(
            publish_token(&headers("Bearer studio")),
            Err(ApiError::AuthMalformed(_))
        ));
        assert!(matches!(
            publish_token(&headers("Bearer studio;a;b")),
            Err(ApiError::AuthMalformed(_))
        ));
    }

    #[test]
    fn test_publish_token_rejects_bad_key() {
        assert!(matches!(
            publish_token(&headers("Bearer stu dio;x")),
            Err(ApiError::AuthMalformed(_))
        ));
        assert!(matches!(
            publish_token(&headers("Bearer ;x")),
            Err(ApiError::AuthMalformed(_))
        ));
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            publish_token(&HeaderMap::new()),
            Err(ApiError::AuthMissing)
        ));
        assert!(matches!(view_stream_key(&headers("")), Err(ApiError::AuthMissing)));
    }

    #[test]
    fn test_view_stream_key_ignores_extra_components() {
        assert_eq!(view_stream_key(&headers("Bearer studio")).unwrap(), "studio");
        assert_eq!(
            view_stream_key(&headers("Bearer studio;ignored")).unwrap(),
            "studio"
        );
        assert!(matches!(
            view_stream_key(&headers("Token studio")),
            Err(ApiError::AuthMalformed(_))
        ));
        assert!(matches!(
            view_stream_key(&headers("Bearer ")),
            Err(ApiError::AuthMalformed(_))
        ));
    }
}
