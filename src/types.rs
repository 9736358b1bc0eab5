//! Core type aliases used throughout the framework.
//!
//! These aliases standardize the types used across the crate for requests,
//! responses, and internal body/error boxing, hiding the underlying generic
//! parameters so the rest of the crate can speak in terms of `Request` and
//! `Response` directly.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use hyper::body::Incoming;

use crate::body::TejasBody;

/// HTTP request type with streaming body support.
pub type Request = hyper::Request<Incoming>;

/// HTTP response type using [`TejasBody`] for body handling.
pub type Response = hyper::Response<TejasBody>;

/// Boxed HTTP body type for internal response composition.
pub(crate) type BoxBody = UnsyncBoxBody<Bytes, BoxError>;

/// Boxed error type for thread-safe, dynamically-dispatched errors.
pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;
