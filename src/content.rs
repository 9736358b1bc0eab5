//! Content-type inference for values sent through [`crate::rc::RequestContext::send`].

use bytes::Bytes;
use serde_json::Value;

/// A value headed out over the wire via `RequestContext::send`.
///
/// Kept as a small closed set rather than a generic `Responder` trait: the
/// engine only ever needs to infer one of these four shapes, matching the
/// dynamically-typed `send(value)` call in the source system.
#[derive(Debug, Clone)]
pub enum SendValue {
    Json(Value),
    Html(String),
    Text(String),
    Bytes(Bytes),
}

impl From<Value> for SendValue {
    fn from(v: Value) -> Self {
        SendValue::Json(v)
    }
}

impl From<String> for SendValue {
    fn from(s: String) -> Self {
        looks_like_html(&s)
            .then(|| SendValue::Html(s.clone()))
            .unwrap_or(SendValue::Text(s))
    }
}

impl From<&str> for SendValue {
    fn from(s: &str) -> Self {
        SendValue::from(s.to_owned())
    }
}

impl From<Bytes> for SendValue {
    fn from(b: Bytes) -> Self {
        SendValue::Bytes(b)
    }
}

fn looks_like_html(s: &str) -> bool {
    let trimmed = s.trim_start().to_ascii_lowercase();
    trimmed.starts_with("<!doctype") || trimmed.starts_with("<html")
}

/// Infers the `Content-Type` header value for a [`SendValue`], per the
/// object/array → JSON, HTML-sniffed string → `text/html`, else → `text/plain`
/// rule.
pub fn infer_content_type(value: &SendValue) -> &'static str {
    match value {
        SendValue::Json(_) => "application/json",
        SendValue::Html(_) => "text/html",
        SendValue::Text(_) => "text/plain",
        SendValue::Bytes(_) => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_values_infer_json() {
        let v = SendValue::from(serde_json::json!({"a": 1}));
        assert_eq!(infer_content_type(&v), "application/json");
    }

    #[test]
    fn html_sniffing_is_case_insensitive_and_trims() {
        let v = SendValue::from("  <!DOCTYPE html><html></html>".to_string());
        assert_eq!(infer_content_type(&v), "text/html");
    }

    #[test]
    fn plain_strings_are_text() {
        let v = SendValue::from("hello".to_string());
        assert_eq!(infer_content_type(&v), "text/plain");
    }
}
