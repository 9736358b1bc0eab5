//! The framework's tagged error sum and the error-sender's resolution rules.
//!
//! Replaces the source system's polymorphic `throw(arg)` with an explicit enum
//! per the REDESIGN FLAGS: `TypedFramework`, `Numeric`, `PhraseError`, `Generic`.
//! `RequestContext::throw` matches on it instead of doing runtime type sniffing.

use std::fmt;

use crate::status::{code_for_phrase, is_status_code, reason_phrase};

/// An error that can be routed through the dispatcher's error-sender.
#[derive(Debug, Clone)]
pub enum FrameworkError {
    /// The framework's own typed error: an explicit status and message.
    TypedFramework { code: u16, message: String },
    /// A bare integer, interpreted as a status code.
    Numeric(i64),
    /// An error whose message happens to equal a known reason phrase.
    PhraseError(String),
    /// Anything else; its string form becomes the response body under 500.
    Generic(String),
}

impl FrameworkError {
    pub fn typed(code: u16, message: impl Into<String>) -> Self {
        FrameworkError::TypedFramework {
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::typed(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::typed(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::typed(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::typed(404, message)
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::typed(405, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::typed(408, message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::typed(413, message)
    }

    pub fn unsupported_media_type(message: impl Into<String>) -> Self {
        Self::typed(415, message)
    }

    pub fn too_many_requests(message: impl Into<String>) -> Self {
        Self::typed(429, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::typed(500, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::typed(501, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::typed(500, message)
    }

    /// Resolves the error into the `(status, body)` pair the error-sender
    /// writes, following the precedence rules in order:
    /// typed → numeric → phrase → generic.
    pub fn resolve(&self) -> (u16, String) {
        match self {
            FrameworkError::TypedFramework { code, message } => (*code, message.clone()),
            FrameworkError::Numeric(n) if is_status_code(*n) => {
                let code = *n as u16;
                (code, reason_phrase(code).to_string())
            }
            FrameworkError::Numeric(n) => (500, n.to_string()),
            FrameworkError::PhraseError(msg) => match code_for_phrase(msg) {
                Some(code) => (code, msg.clone()),
                None => (500, msg.clone()),
            },
            FrameworkError::Generic(msg) => {
                if let Ok(n) = msg.trim().parse::<i64>() {
                    if is_status_code(n) {
                        return (n as u16, msg.clone());
                    }
                }
                if let Some(code) = code_for_phrase(msg) {
                    return (code, msg.clone());
                }
                (500, msg.clone())
            }
        }
    }

    /// The default "no argument" case of the source `throw()`: 500, "Internal
    /// Server Error".
    pub fn default_internal() -> Self {
        FrameworkError::TypedFramework {
            code: 500,
            message: reason_phrase(500).to_string(),
        }
    }
}

impl fmt::Display for FrameworkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (code, message) = self.resolve();
        write!(f, "{code} {message}")
    }
}

impl std::error::Error for FrameworkError {}

impl From<anyhow::Error> for FrameworkError {
    fn from(err: anyhow::Error) -> Self {
        FrameworkError::Generic(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_resolves_verbatim() {
        let e = FrameworkError::not_found("missing");
        assert_eq!(e.resolve(), (404, "missing".to_string()));
    }

    #[test]
    fn numeric_in_range_becomes_status() {
        let e = FrameworkError::Numeric(404);
        assert_eq!(e.resolve(), (404, "Not Found".to_string()));
    }

    #[test]
    fn numeric_out_of_range_falls_back_to_500() {
        let e = FrameworkError::Numeric(7000);
        assert_eq!(e.resolve().0, 500);
    }

    #[test]
    fn generic_message_that_parses_as_status() {
        let e = FrameworkError::Generic("404".to_string());
        assert_eq!(e.resolve(), (404, "404".to_string()));
    }

    #[test]
    fn generic_message_matching_phrase() {
        let e = FrameworkError::Generic("Forbidden".to_string());
        assert_eq!(e.resolve(), (403, "Forbidden".to_string()));
    }

    #[test]
    fn generic_message_unrecognized_is_internal() {
        let e = FrameworkError::Generic("disk on fire".to_string());
        assert_eq!(e.resolve(), (500, "disk on fire".to_string()));
    }
}
