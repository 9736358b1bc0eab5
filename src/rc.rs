//! The Request Context ("RC"): the enhanced request/response pair threaded
//! through the middleware chain. See spec.md §3 "Request Context (RC)" and
//! §4.2 step 3 ("enhance").

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use hyper::body::Incoming;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::body::TejasBody;
use crate::config::Config;
use crate::content::{infer_content_type, SendValue};
use crate::error::FrameworkError;
use crate::parser::{self, MultipartPart, ParsedBody};
use crate::status::reason_phrase;

/// One entry of the merged request payload (body ∪ query ∪ route params).
#[derive(Debug, Clone)]
pub enum PayloadValue {
    Json(Value),
    Text(String),
    Multipart(MultipartPart),
}

impl PayloadValue {
    /// Best-effort string view, used by `RequestContext::param`/`query`-style
    /// accessors that only care about scalar values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Text(s) => Some(s),
            PayloadValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }
}

/// Mapping from field name to merged payload value.
pub type Payload = HashMap<String, PayloadValue>;

/// The per-request, exclusively-owned context threaded through the
/// middleware chain by value. Once a response has been sent (`sent == true`)
/// every further `send`/`throw` call is a no-op.
pub struct RequestContext {
    pub method: Method,
    pub ip: IpAddr,
    pub headers: HeaderMap,
    /// Raw path, as presented on the wire, including the query string.
    pub path: String,
    /// Path with the query string stripped.
    pub endpoint: String,
    pub protocol: &'static str,
    pub hostname: String,
    pub full_url: String,
    pub payload: Payload,
    /// Last body written, kept around for request logging.
    pub dispatched_data: Option<Bytes>,
    /// Headers staged by middleware (e.g. the rate limiter's `RateLimit-*`
    /// headers) that get merged into whatever response is eventually sent,
    /// regardless of which later step ends up calling `send`/`throw`.
    pending_headers: HeaderMap,
    sent: bool,
    response: Option<http::Response<TejasBody>>,
}

impl RequestContext {
    /// Builds and "enhances" an RC from a raw request: fills method/headers/ip,
    /// infers protocol/hostname from forwarding headers, decodes the body, and
    /// merges query string → body → route params (later overwrites earlier).
    pub async fn build(
        req: http::Request<Incoming>,
        remote_ip: IpAddr,
        is_tls: bool,
        route_params: HashMap<String, String>,
        config: &Config,
    ) -> Result<Self, FrameworkError> {
        let (parts, body) = req.into_parts();
        let headers = parts.headers;

        let ip = client_ip(&headers, remote_ip);
        let protocol = if is_tls {
            "https"
        } else if first_forwarded(&headers, "x-forwarded-proto").as_deref() == Some("https") {
            "https"
        } else {
            "http"
        };
        let hostname = hostname_from(&headers);
        let raw_path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        let endpoint = parts.uri.path().to_string();
        let full_url = format!("{protocol}://{hostname}{raw_path_and_query}");

        let mut payload: Payload = HashMap::new();

        if let Some(query) = parts.uri.query() {
            let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
            for (k, v) in pairs {
                payload.insert(k, PayloadValue::Text(v));
            }
        }

        if method_may_have_body(&parts.method) {
            let timeout = Duration::from_millis(config.body_timeout_ms);
            let parsed = parser::parse_body(&headers, body, config.body_max_size, timeout).await?;
            merge_body_into_payload(&mut payload, parsed);
        }

        for (k, v) in route_params {
            payload.insert(k, PayloadValue::Text(v));
        }

        Ok(RequestContext {
            method: parts.method,
            ip,
            headers,
            path: raw_path_and_query,
            endpoint,
            protocol,
            hostname,
            full_url,
            payload,
            dispatched_data: None,
            pending_headers: HeaderMap::new(),
            sent: false,
            response: None,
        })
    }

    pub fn is_get(&self) -> bool {
        self.method == Method::GET
    }
    pub fn is_post(&self) -> bool {
        self.method == Method::POST
    }
    pub fn is_put(&self) -> bool {
        self.method == Method::PUT
    }
    pub fn is_delete(&self) -> bool {
        self.method == Method::DELETE
    }
    pub fn is_patch(&self) -> bool {
        self.method == Method::PATCH
    }
    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }
    pub fn is_options(&self) -> bool {
        self.method == Method::OPTIONS
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Stages a header to be merged into whatever response eventually gets
    /// written, regardless of which later middleware/handler calls
    /// `send`/`throw`. Used by the rate limiter to attach `RateLimit-*`
    /// headers ahead of a decision on whether the request proceeds.
    pub fn insert_header(mut self, name: http::HeaderName, value: http::HeaderValue) -> Self {
        self.pending_headers.insert(name, value);
        self
    }

    /// Reads a merged payload field as a string (route param, query param, or
    /// a scalar JSON/form body field).
    pub fn param(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(PayloadValue::as_str)
    }

    /// Alias for [`Self::param`] kept for call sites that specifically mean
    /// "query string parameter" (they read from the same merged payload).
    pub fn query(&self, name: &str) -> Option<&str> {
        self.param(name)
    }

    /// Deserializes the whole payload (as a JSON object) into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, FrameworkError> {
        let mut object = serde_json::Map::new();
        for (k, v) in &self.payload {
            let value = match v {
                PayloadValue::Json(j) => j.clone(),
                PayloadValue::Text(s) => Value::String(s.clone()),
                PayloadValue::Multipart(part) => {
                    Value::String(String::from_utf8_lossy(&part.value).into_owned())
                }
            };
            object.insert(k.clone(), value);
        }
        serde_json::from_value(Value::Object(object))
            .map_err(|e| FrameworkError::bad_request(e.to_string()))
    }

    /// Sends `value` with status 200, unless a response has already latched.
    pub fn send(mut self, value: impl Into<SendValue>) -> Self {
        if self.sent {
            return self;
        }
        self.write_response(200, value.into());
        self
    }

    /// Sends `value` with an explicit status code.
    pub fn send_status(mut self, code: u16, value: impl Into<SendValue>) -> Self {
        if self.sent {
            return self;
        }
        self.write_response(code, value.into());
        self
    }

    /// Routes `err` through the error-sender's precedence rules (spec.md §4.2).
    /// Idempotent against the `sent` latch.
    pub fn throw(mut self, err: FrameworkError) -> Self {
        if self.sent {
            return self;
        }
        let (code, message) = err.resolve();
        self.write_response(code, SendValue::Text(message));
        self
    }

    /// The "no argument" default-500 case of the source `throw()`.
    pub fn throw_default(self) -> Self {
        self.throw(FrameworkError::default_internal())
    }

    fn write_response(&mut self, code: u16, value: SendValue) {
        let content_type = infer_content_type(&value);
        let body_bytes: Bytes = match value {
            SendValue::Json(v) => Bytes::from(serde_json::to_vec(&v).unwrap_or_default()),
            SendValue::Html(s) | SendValue::Text(s) => Bytes::from(s),
            SendValue::Bytes(b) => b,
        };

        self.dispatched_data = Some(body_bytes.clone());

        let mut builder = http::Response::builder().status(code);
        if let Some(headers) = builder.headers_mut() {
            headers.insert(
                http::header::CONTENT_TYPE,
                http::HeaderValue::from_static(content_type),
            );
            for (name, value) in self.pending_headers.iter() {
                headers.insert(name.clone(), value.clone());
            }
        }
        let response = builder
            .body(TejasBody::from(body_bytes))
            .unwrap_or_else(|_| {
                http::Response::builder()
                    .status(500)
                    .body(TejasBody::from(reason_phrase(500)))
                    .expect("static fallback response is always well-formed")
            });

        self.response = Some(response);
        self.sent = true;
    }

    /// Consumes the RC, returning the response latched by `send`/`throw`, or a
    /// default 500 ("terminal step never sent a response") if none was set.
    pub fn into_response(mut self) -> http::Response<TejasBody> {
        if let Some(response) = self.response.take() {
            return response;
        }
        self.write_response(500, SendValue::Text(reason_phrase(500).to_string()));
        self.response.take().expect("just wrote a response")
    }
}

fn method_may_have_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE)
}

fn merge_body_into_payload(payload: &mut Payload, parsed: ParsedBody) {
    match parsed {
        ParsedBody::Empty => {}
        ParsedBody::Json(Value::Object(map)) => {
            for (k, v) in map {
                payload.insert(k, PayloadValue::Json(v));
            }
        }
        ParsedBody::Json(other) => {
            payload.insert("_body".to_string(), PayloadValue::Json(other));
        }
        ParsedBody::Form(pairs) => {
            for (k, v) in pairs {
                payload.insert(k, PayloadValue::Text(v));
            }
        }
        ParsedBody::Multipart(parts) => {
            for part in parts {
                payload.insert(part.name.clone(), PayloadValue::Multipart(part));
            }
        }
    }
}

fn first_forwarded(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string())
}

fn client_ip(headers: &HeaderMap, socket_ip: IpAddr) -> IpAddr {
    first_forwarded(headers, "x-forwarded-for")
        .and_then(|ip| ip.parse().ok())
        .unwrap_or(socket_ip)
}

fn hostname_from(headers: &HeaderMap) -> String {
    let raw = first_forwarded(headers, "x-forwarded-host")
        .or_else(|| {
            headers
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| "localhost".to_string());
    strip_port(&raw)
}

/// Strips a trailing `:port`, respecting bracketed IPv6 literals (`[::1]:8080`).
fn strip_port(host: &str) -> String {
    if let Some(stripped) = host.strip_prefix('[') {
        if let Some(end) = stripped.find(']') {
            return format!("[{}]", &stripped[..end]);
        }
        return host.to_string();
    }
    match host.rsplit_once(':') {
        Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h.to_string(),
        _ => host.to_string(),
    }
}

/// Test-only helpers for constructing bare [`RequestContext`] values without
/// going through the full `build()` pipeline.
#[cfg(test)]
pub mod tests_support {
    use super::*;

    pub fn blank_rc() -> RequestContext {
        RequestContext {
            method: Method::GET,
            ip: "127.0.0.1".parse().unwrap(),
            headers: HeaderMap::new(),
            path: "/".to_string(),
            endpoint: "/".to_string(),
            protocol: "http",
            hostname: "localhost".to_string(),
            full_url: "http://localhost/".to_string(),
            payload: HashMap::new(),
            dispatched_data: None,
            pending_headers: HeaderMap::new(),
            sent: false,
            response: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ipv4_port() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
    }

    #[test]
    fn strips_ipv6_port_preserving_brackets() {
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
    }

    #[test]
    fn forwarded_headers_take_first_entry() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "1.2.3.4, 5.6.7.8".parse().unwrap());
        assert_eq!(first_forwarded(&headers, "x-forwarded-for").as_deref(), Some("1.2.3.4"));
    }
}
