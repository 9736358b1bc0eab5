//! HTTP status code helpers: canonical reason phrases and range checks.
//!
//! Mirrors the status/content helper component of the dispatch engine: callers
//! never hand-roll a reason phrase, they ask this module for the canonical one.

/// Returns the canonical IANA reason phrase for a known status code, or
/// `"Unknown Status"` for anything else.
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        422 => "Unprocessable Entity",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown Status",
    }
}

/// Looks up the status code whose canonical reason phrase matches `phrase`,
/// case-insensitively. Used by the error-sender's "phrase error" branch.
pub fn code_for_phrase(phrase: &str) -> Option<u16> {
    const KNOWN: &[u16] = &[
        100, 101, 200, 201, 202, 204, 206, 301, 302, 303, 304, 307, 308, 400, 401, 402, 403, 404,
        405, 406, 408, 409, 410, 411, 412, 413, 414, 415, 416, 417, 422, 425, 426, 428, 429, 431,
        451, 500, 501, 502, 503, 504, 505,
    ];
    let phrase = phrase.trim();
    KNOWN
        .iter()
        .copied()
        .find(|&code| reason_phrase(code).eq_ignore_ascii_case(phrase))
}

/// True if `n` falls in the valid HTTP status code range `100..=599`.
pub fn is_status_code(n: i64) -> bool {
    (100..=599).contains(&n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_resolve() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(429), "Too Many Requests");
        assert_eq!(reason_phrase(999), "Unknown Status");
    }

    #[test]
    fn phrase_lookup_is_case_insensitive() {
        assert_eq!(code_for_phrase("not found"), Some(404));
        assert_eq!(code_for_phrase("NOT FOUND"), Some(404));
        assert_eq!(code_for_phrase("nonsense"), None);
    }

    #[test]
    fn status_range_check() {
        assert!(is_status_code(100));
        assert!(is_status_code(599));
        assert!(!is_status_code(99));
        assert!(!is_status_code(600));
    }
}
