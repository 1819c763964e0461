//! Classification of raw provider responses into retry verdicts.
//!
//! Providers signal throttling in free text inside otherwise ordinary JSON
//! bodies. This is the only place that text is pattern-matched; everything
//! downstream works with [`RetryVerdict`].
//!
//! # Rules
//!
//! | Condition (checked in order)                         | Verdict        |
//! |------------------------------------------------------|----------------|
//! | No payload                                           | `Fatal`        |
//! | Usable media present                                 | `Success`      |
//! | Text contains "please try again later"               | `RetryLater`   |
//! | Text contains "per second"                           | `RetryNow`     |
//! | Explicit provider error                              | `Fatal(error)` |
//! | Nothing usable                                       | `Fatal`        |
//!
//! Throttle markers always beat emptiness, so an empty-looking body that
//! carries a marker is retried instead of failing the provider.

use serde_json::Value;

/// Marker for provider-side cooldowns.
const RETRY_LATER_MARKER: &str = "please try again later";

/// Marker for per-second quota hits.
const RETRY_NOW_MARKER: &str = "per second";

/// Outcome of classifying one provider response.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryVerdict {
    /// The payload is usable.
    Success(Value),
    /// Per-second rate limit hit; retry after a short jitter.
    RetryNow,
    /// Provider-side cooldown; retry a bounded number of times.
    RetryLater,
    /// Hard failure; never retried.
    Fatal(String),
}

impl RetryVerdict {
    /// Returns true for `RetryNow` and `RetryLater`.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RetryNow | Self::RetryLater)
    }
}

/// How a provider lays out its response.
///
/// Each adapter describes where its media entries live and how it reports
/// errors; the shared [`classify`] applies the ordering rules.
pub trait ResponseShape: Send + Sync {
    /// Returns true if the payload carries at least one usable media entry.
    fn has_media(&self, payload: &Value) -> bool;

    /// Returns the provider's explicit error message, if any.
    fn error_message(&self, payload: &Value) -> Option<String>;
}

/// Classifies a raw provider payload.
#[must_use]
pub fn classify(payload: Option<&Value>, shape: &dyn ResponseShape) -> RetryVerdict {
    let Some(payload) = payload.filter(|value| !value.is_null()) else {
        return RetryVerdict::Fatal("empty response".to_string());
    };

    if shape.has_media(payload) {
        return RetryVerdict::Success(payload.clone());
    }

    let text = payload.to_string().to_lowercase();
    if text.contains(RETRY_LATER_MARKER) {
        return RetryVerdict::RetryLater;
    }
    if text.contains(RETRY_NOW_MARKER) {
        return RetryVerdict::RetryNow;
    }

    if let Some(message) = shape.error_message(payload) {
        return RetryVerdict::Fatal(message);
    }

    RetryVerdict::Fatal("empty result".to_string())
}

/// Shape of the aggregator family: a `medias` list plus the common
/// `error`/`message`/`status` error layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct MediasShape;

impl ResponseShape for MediasShape {
    fn has_media(&self, payload: &Value) -> bool {
        is_non_empty(payload.get("medias"))
    }

    fn error_message(&self, payload: &Value) -> Option<String> {
        error_message_from_fields(payload)
    }
}

/// Returns true if `value` is a non-empty array, object or string.
#[must_use]
pub fn is_non_empty(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
        Some(Value::String(text)) => !text.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

/// Reads the common `{"error": …, "message": …, "status": …}` error layout.
///
/// A truthy `error` with a `message` yields `"<message>, status: <status>"`,
/// otherwise the error value itself.
#[must_use]
pub fn error_message_from_fields(payload: &Value) -> Option<String> {
    let error = payload.get("error")?;
    if !is_truthy(error) {
        return None;
    }
    if let Some(message) = payload.get("message").and_then(Value::as_str)
        && !message.is_empty()
    {
        let status = payload.get("status").map_or_else(
            || "unknown".to_string(),
            |status| match status {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        );
        return Some(format!("{message}, status: {status}"));
    }
    Some(match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
