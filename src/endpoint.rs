//! Endpoint records and path normalization.

use std::collections::HashMap;

use crate::error::FrameworkError;
use crate::middleware::{HandlerFn, Middleware};

/// One registered path pattern, its middleware chain, and its terminal
/// handler. Immutable after registration.
pub struct Endpoint {
    pub path: String,
    pub middlewares: Vec<Middleware>,
    pub handler: HandlerFn,
}

impl Endpoint {
    pub fn new(path: &str, middlewares: Vec<Middleware>, handler: HandlerFn) -> Result<Self, FrameworkError> {
        let path = normalize_path(path)?;
        validate_param_names(&path)?;
        Ok(Endpoint {
            path,
            middlewares,
            handler,
        })
    }

    /// Splits the normalized path into its non-empty segments (empty
    /// segments from e.g. a doubled slash are discarded).
    pub fn segments(&self) -> Vec<&str> {
        segments_of(&self.path)
    }
}

/// Splits on `/`, discarding empty segments produced along the way.
pub fn segments_of(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Normalizes a path: must start with `/`; trailing `/` is stripped except
/// for the root path itself. No other slash collapsing happens here — empty
/// segments are discarded later, at match time.
pub fn normalize_path(path: &str) -> Result<String, FrameworkError> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(FrameworkError::bad_request(format!(
            "invalid path: {path:?} must start with '/'"
        )));
    }
    if path == "/" {
        return Ok(path.to_string());
    }
    Ok(path.trim_end_matches('/').to_string())
}

/// Rejects empty parameter names (a bare `:` segment) at registration time.
fn validate_param_names(path: &str) -> Result<(), FrameworkError> {
    for segment in segments_of(path) {
        if let Some(name) = segment.strip_prefix(':') {
            if name.is_empty() {
                return Err(FrameworkError::bad_request(
                    "parameter segment has an empty name",
                ));
            }
        }
    }
    Ok(())
}

/// Attempts to match `request_path` (already normalized) against this
/// endpoint's pattern, returning the extracted route parameters on success.
/// Requires equal segment counts; every non-parameter segment must match
/// literally, and parameter segments bind by name.
pub fn match_segments(pattern_segments: &[&str], request_segments: &[&str]) -> Option<HashMap<String, String>> {
    if pattern_segments.len() != request_segments.len() {
        return None;
    }
    let mut params = HashMap::new();
    for (pattern_seg, request_seg) in pattern_segments.iter().zip(request_segments.iter()) {
        if let Some(name) = pattern_seg.strip_prefix(':') {
            params.insert(name.to_string(), request_seg.to_string());
        } else if *pattern_seg != *request_seg {
            return None;
        }
    }
    Some(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_except_root() {
        assert_eq!(normalize_path("/users/").unwrap(), "/users");
        assert_eq!(normalize_path("/").unwrap(), "/");
        assert_eq!(normalize_path("/a/b/").unwrap(), "/a/b");
    }

    #[test]
    fn rejects_paths_without_leading_slash() {
        assert!(normalize_path("users").is_err());
        assert!(normalize_path("").is_err());
    }

    #[test]
    fn rejects_empty_parameter_name() {
        assert!(normalize_path("/users/:").is_ok());
        assert!(validate_param_names("/users/:").is_err());
    }

    #[test]
    fn matches_literal_and_parameter_segments() {
        let pattern = segments_of("/users/:id");
        let request = segments_of("/users/42");
        let params = match_segments(&pattern, &request).unwrap();
        assert_eq!(params.get("id"), Some(&"42".to_string()));
    }

    #[test]
    fn mismatched_segment_count_does_not_match() {
        let pattern = segments_of("/users/:id");
        let request = segments_of("/users/42/extra");
        assert!(match_segments(&pattern, &request).is_none());
    }

    #[test]
    fn literal_mismatch_does_not_match() {
        let pattern = segments_of("/users/me");
        let request = segments_of("/users/7");
        assert!(match_segments(&pattern, &request).is_none());
    }
}
