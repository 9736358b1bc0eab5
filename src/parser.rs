//! Request body parsing: size/time-bounded read plus content-type dispatch
//! into JSON, form-urlencoded, or multipart payloads. See spec.md §4.3.

use std::collections::HashMap;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::HeaderMap;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use serde_json::Value;

use crate::error::FrameworkError;

/// One part of a decoded `multipart/form-data` body.
#[derive(Debug, Clone)]
pub struct MultipartPart {
    pub name: String,
    pub filename: Option<String>,
    pub headers: HashMap<String, String>,
    pub value: Vec<u8>,
}

/// The body parser's decoded result, before it is merged into the request
/// payload by the dispatcher.
#[derive(Debug, Clone)]
pub enum ParsedBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    Multipart(Vec<MultipartPart>),
}

/// Reads a body stream under a byte cap and a wall-clock deadline.
///
/// Mirrors `BODY_MAX_SIZE` / `BODY_TIMEOUT`: overflow is `PayloadTooLarge`
/// (413), a stalled read past the deadline is `Timeout` (408), any I/O error
/// from the transport is `InvalidInput` (400).
pub async fn read_body_bounded(
    body: Incoming,
    max_bytes: usize,
    timeout: Duration,
) -> Result<Bytes, FrameworkError> {
    let read = async move {
        let mut body = body;
        let mut buf = BytesMut::new();
        while let Some(frame) = body.frame().await {
            let frame = frame.map_err(|e| FrameworkError::bad_request(e.to_string()))?;
            if let Ok(data) = frame.into_data() {
                if buf.len() + data.len() > max_bytes {
                    return Err(FrameworkError::payload_too_large(
                        "request body exceeds the configured size limit",
                    ));
                }
                buf.extend_from_slice(&data);
            }
        }
        Ok(buf.freeze())
    };

    match tokio::time::timeout(timeout, read).await {
        Ok(result) => result,
        Err(_) => Err(FrameworkError::timeout("body read timed out")),
    }
}

/// Parses a request body according to its `Content-Type` header, applying the
/// exact rules in spec.md §4.3.
pub async fn parse_body(
    headers: &HeaderMap,
    body: Incoming,
    max_bytes: usize,
    timeout: Duration,
) -> Result<ParsedBody, FrameworkError> {
    let content_type = content_type_header(headers)?;
    let mime = mime_of(&content_type);

    match mime.as_str() {
        "application/json" => {
            let bytes = read_body_bounded(body, max_bytes, timeout).await?;
            if bytes.is_empty() {
                return Ok(ParsedBody::Empty);
            }
            let value: Value = serde_json::from_slice(&bytes)
                .map_err(|e| FrameworkError::bad_request(format!("invalid JSON body: {e}")))?;
            if !value.is_object() && !value.is_array() {
                return Err(FrameworkError::bad_request(
                    "JSON body must be an object or array",
                ));
            }
            Ok(ParsedBody::Json(value))
        }
        "application/x-www-form-urlencoded" => {
            let bytes = read_body_bounded(body, max_bytes, timeout).await?;
            if bytes.is_empty() {
                return Ok(ParsedBody::Empty);
            }
            let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
                .map_err(|e| FrameworkError::bad_request(format!("invalid form body: {e}")))?;
            Ok(ParsedBody::Form(pairs))
        }
        "multipart/form-data" => {
            let boundary = extract_boundary(&content_type).ok_or_else(|| {
                FrameworkError::bad_request("multipart body missing boundary parameter")
            })?;
            let bytes = read_body_bounded(body, max_bytes, timeout).await?;
            let parts = parse_multipart(&bytes, &boundary)?;
            Ok(ParsedBody::Multipart(parts))
        }
        _ => Err(FrameworkError::unsupported_media_type(format!(
            "unsupported content type: {mime}"
        ))),
    }
}

/// The `Content-Type` precheck spec.md §4.3 puts ahead of every format
/// branch: missing header → 400. Split out from `parse_body` so it is
/// testable without a live `Incoming` body.
fn content_type_header(headers: &HeaderMap) -> Result<String, FrameworkError> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| FrameworkError::bad_request("missing Content-Type header"))
}

fn mime_of(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

fn extract_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|segment| {
        let segment = segment.trim();
        segment
            .strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

/// Hand-rolled multipart parser implementing spec.md's exact edge-case rules:
/// split on the boundary delimiter, split each part's headers from its value
/// on a literal `\r\n\r\n`, require a `Content-Disposition` header.
fn parse_multipart(bytes: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, FrameworkError> {
    let delimiter = format!("--{boundary}").into_bytes();
    let mut parts = Vec::new();

    for chunk in split_on(bytes, &delimiter) {
        let chunk = trim_crlf(chunk);
        if chunk.is_empty() || chunk == b"--" {
            continue;
        }
        let chunk = chunk.strip_prefix(b"\r\n").unwrap_or(chunk);
        let chunk = chunk.strip_suffix(b"--").unwrap_or(chunk);
        let chunk = trim_crlf(chunk);
        if chunk.is_empty() {
            continue;
        }

        let Some(split_at) = find_subslice(chunk, b"\r\n\r\n") else {
            continue;
        };
        let header_block = &chunk[..split_at];
        let mut value = chunk[split_at + 4..].to_vec();
        if value.ends_with(b"\r\n") {
            value.truncate(value.len() - 2);
        }

        let headers = parse_part_headers(header_block);
        let disposition = headers
            .get("content-disposition")
            .ok_or_else(|| FrameworkError::bad_request("multipart part missing Content-Disposition"))?;

        let name = extract_disposition_param(disposition, "name")
            .ok_or_else(|| FrameworkError::bad_request("multipart part missing name"))?;
        let filename = extract_disposition_param(disposition, "filename");

        parts.push(MultipartPart {
            name,
            filename,
            headers,
            value,
        });
    }

    Ok(parts)
}

fn parse_part_headers(block: &[u8]) -> HashMap<String, String> {
    let text = String::from_utf8_lossy(block);
    let mut headers = HashMap::new();
    for line in text.split("\r\n") {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(
                name.trim().to_ascii_lowercase(),
                value.trim().to_string(),
            );
        }
    }
    headers
}

fn extract_disposition_param(disposition: &str, param: &str) -> Option<String> {
    disposition.split(';').find_map(|segment| {
        let segment = segment.trim();
        segment
            .strip_prefix(&format!("{param}="))
            .map(|v| v.trim_matches('"').to_string())
    })
}

fn trim_crlf(mut s: &[u8]) -> &[u8] {
    while s.starts_with(b"\r\n") {
        s = &s[2..];
    }
    s
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn split_on<'a>(haystack: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut out = Vec::new();
    let mut rest = haystack;
    while let Some(pos) = find_subslice(rest, delimiter) {
        out.push(&rest[..pos]);
        rest = &rest[pos + delimiter.len()..];
    }
    out.push(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_extracts_name_and_filename() {
        let body = b"--X\r\nContent-Disposition: form-data; name=\"field1\"\r\n\r\nvalue1\r\n--X\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\nContent-Type: text/plain\r\n\r\nhello\r\n--X--\r\n";
        let parts = parse_multipart(body, "X").unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "field1");
        assert_eq!(parts[0].value, b"value1");
        assert_eq!(parts[1].filename.as_deref(), Some("a.txt"));
        assert_eq!(parts[1].value, b"hello");
    }

    #[test]
    fn boundary_extraction_handles_quotes() {
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"abc123\""),
            Some("abc123".to_string())
        );
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=abc123"),
            Some("abc123".to_string())
        );
    }

    #[test]
    fn missing_content_type_is_bad_request() {
        let headers = HeaderMap::new();
        let err = content_type_header(&headers).unwrap_err();
        assert_eq!(err.resolve().0, 400);
    }

    #[test]
    fn content_type_header_strips_parameters() {
        let mut headers = HeaderMap::new();
        headers.insert(
            http::header::CONTENT_TYPE,
            "application/json; charset=utf-8".parse().unwrap(),
        );
        let content_type = content_type_header(&headers).unwrap();
        assert_eq!(mime_of(&content_type), "application/json");
    }
}
