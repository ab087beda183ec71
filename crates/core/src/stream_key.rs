//! Stream key grammar
//!
//! A stream key names a broadcast. It is used both for ingest authorization
//! (together with a secret) and for egress addressing (on its own), so it is
//! validated before it reaches the credential store or the media engine.

/// Returns `true` when `key` is non-empty and consists only of ASCII letters,
/// digits and `_ - . ~`.
pub fn validate_stream_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(is_stream_key_char)
}

fn is_stream_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '~')
}
