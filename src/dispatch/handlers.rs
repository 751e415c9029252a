//! Ready-made operation handlers.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;

use crate::dispatch::table::{handler_fn, OperationHandler};

/// Serve a fixed document, e.g. a capabilities file read at startup.
pub fn static_document(body: impl Into<Bytes>, content_type: &'static str) -> OperationHandler {
    let body: Bytes = body.into();
    handler_fn(move |state| {
        let body = body.clone();
        async move {
            tracing::debug!(service = %state.service, bytes = body.len(), "Serving static document");
            let mut response = Response::new(Body::from(body));
            *response.status_mut() = StatusCode::OK;
            let headers = response.headers_mut();
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("private"));
            Ok(response)
        }
    })
}
