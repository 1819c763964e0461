//! Helpers shared by provider adapters.

use reqwest::RequestBuilder;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::ThirdApiError;
use super::classify::{ResponseShape, RetryVerdict, classify};
use super::http_client::PROVIDER_TIMEOUT;
use super::retry::RetryFailure;

// ==================== Request attempts ====================

/// Sends one provider request and classifies the response.
///
/// Transport failures are fatal. A body that is not JSON is classified as a
/// plain string so throttle markers in text bodies are still honored.
pub(crate) async fn attempt(
    provider: &str,
    request: RequestBuilder,
    shape: &dyn ResponseShape,
) -> RetryVerdict {
    let response = match request.timeout(PROVIDER_TIMEOUT).send().await {
        Ok(response) => response,
        Err(error) => {
            warn!(provider, error = %error, "provider request failed");
            return RetryVerdict::Fatal(format!("request failed: {error}"));
        }
    };

    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(error) => {
            warn!(provider, status, error = %error, "cannot read provider response");
            return RetryVerdict::Fatal(format!("cannot read response: {error}"));
        }
    };
    debug!(provider, status, bytes = body.len(), "provider responded");

    let payload = parse_payload(&body);
    classify(payload.as_ref(), shape)
}

/// Parses a response body; empty bodies are absent, non-JSON becomes a string.
pub(crate) fn parse_payload(body: &str) -> Option<Value> {
    if body.trim().is_empty() {
        return None;
    }
    Some(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
}

/// Maps a retry loop failure onto the error taxonomy.
pub(crate) fn retry_failure_to_error(
    provider: &str,
    input: &str,
    failure: RetryFailure,
) -> ThirdApiError {
    match failure {
        RetryFailure::Fatal(reason) => ThirdApiError::provider_fatal(provider, input, &reason),
        RetryFailure::Exhausted(reason) => ThirdApiError::provider_transient(provider, &reason),
    }
}

// ==================== JSON field access ====================

/// Reads a string field; numbers are stringified, empty strings are absent.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Reads a non-negative integer field, accepting numeric strings and floats.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn u64_field(value: &Value, key: &str) -> Option<u64> {
    match value.get(key)? {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a `u32` field (dimensions).
pub(crate) fn u32_field(value: &Value, key: &str) -> Option<u32> {
    u64_field(value, key).and_then(|v| u32::try_from(v).ok())
}

/// Reads a float field, accepting numeric strings.
pub(crate) fn f64_field(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Reads a flag with loose truthiness (`true`, non-zero, non-empty).
pub(crate) fn bool_field(value: &Value, key: &str) -> bool {
    match value.get(key) {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(number)) => number.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(text)) => !text.is_empty() && text != "false" && text != "0",
        _ => false,
    }
}

/// Returns the array at `key`, or an empty slice.
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map_or(&[], Vec::as_slice)
}

// ==================== Identity and durations ====================

/// Derives a stable id from a title or URL when the provider gives none.
pub(crate) fn content_id(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest[..16].iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Parses a duration given as seconds, `MM:SS` or `HH:MM:SS`.
pub(crate) fn parse_duration(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_duration_str(text),
        _ => None,
    }
}

fn parse_duration_str(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(seconds) = text.parse::<f64>() {
        return Some(seconds);
    }

    let parts: Vec<&str> = text.split(':').collect();
    if parts.len() > 3 {
        return None;
    }
    parts.iter().try_fold(0.0, |total, part| {
        part.trim().parse::<f64>().ok().map(|v| total * 60.0 + v)
    })
}

/// Returns the lowercase file extension of a URL path, if it looks like one.
pub(crate) fn url_extension(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_payload_variants() {
        assert_eq!(parse_payload("  "), None);
        assert_eq!(parse_payload(r#"{"a":1}"#), Some(json!({"a": 1})));
        assert_eq!(
            parse_payload("Too many requests per second"),
            Some(Value::String("Too many requests per second".to_string()))
        );
    }

    #[test]
    fn test_field_readers_are_lenient() {
        let value = json!({
            "id": 12345,
            "title": "  ",
            "size": "2048",
            "width": 1920.0,
            "bitrate": "128000.5",
            "flag": 1,
            "off": "false"
        });
        assert_eq!(str_field(&value, "id").as_deref(), Some("12345"));
        assert_eq!(str_field(&value, "title"), None);
        assert_eq!(u64_field(&value, "size"), Some(2048));
        assert_eq!(u32_field(&value, "width"), Some(1920));
        assert_eq!(f64_field(&value, "bitrate"), Some(128_000.5));
        assert!(bool_field(&value, "flag"));
        assert!(!bool_field(&value, "off"));
        assert!(!bool_field(&value, "missing"));
        assert!(array_field(&value, "missing").is_empty());
    }

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration(Some(&json!(42))), Some(42.0));
        assert_eq!(parse_duration(Some(&json!("90"))), Some(90.0));
        assert_eq!(parse_duration(Some(&json!("01:30"))), Some(90.0));
        assert_eq!(parse_duration(Some(&json!("1:01:30"))), Some(3690.0));
        assert_eq!(parse_duration(Some(&json!("soon"))), None);
        assert_eq!(parse_duration(None), None);
    }

    #[test]
    fn test_content_id_is_stable_hex() {
        let a = content_id("My Title");
        assert_eq!(a, content_id("My Title"));
        assert_ne!(a, content_id("Other"));
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_url_extension() {
        assert_eq!(
            url_extension("https://cdn.example.com/a/b.MP4?sig=1").as_deref(),
            Some("mp4")
        );
        assert_eq!(url_extension("https://cdn.example.com/a/b"), None);
    }

    #[test]
    fn test_retry_failure_mapping() {
        let err = retry_failure_to_error("p", "u", RetryFailure::Exhausted("x".to_string()));
        assert!(matches!(err, ThirdApiError::ProviderTransient { .. }));
        let err = retry_failure_to_error("p", "u", RetryFailure::Fatal("y".to_string()));
        assert!(matches!(err, ThirdApiError::ProviderFatal { .. }));
    }
}
