//! Response construction helpers.
//!
//! # Responsibilities
//! - Build complete text responses (exception reports, capabilities, plain status)
//! - Build streamed responses for payloads produced incrementally (tiles, features)
//!
//! # Design Decisions
//! - Every protocol response is `Cache-Control: private`
//! - Text bodies are UTF-8 and say so in `Content-Type`
//! - Streams are piped through without buffering

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures_util::Stream;

/// Build a complete text response.
pub fn text_response(status: StatusCode, mime_type: &str, body: impl Into<String>) -> Response {
    let body: String = body.into();
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&format!("{}; charset=utf-8", mime_type)) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
    response
}

/// Build a response that pipes `stream` to the client as it produces bytes.
pub fn stream_response<S, E>(status: StatusCode, mime_type: &str, stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
    response
}
