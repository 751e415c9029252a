//! Per-request state.
//!
//! # Responsibilities
//! - Carry everything the pipeline learned about a request to its handler
//! - Hold the authorization outcome and the parsed body
//! - Reconstruct the public service URL for capabilities documents
//!
//! # Design Decisions
//! - Created once per request and owned by exactly one task
//! - Service and operation are typed, hence always lower-case when printed
//! - Authorization distinguishes "not evaluated" from "no callback configured"

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, Method, Uri};

use crate::dispatch::options::DispatchOptions;
use crate::http::query::ParamTable;
use crate::protocol::{Operation, Service};
use crate::xml::{Document, DocumentParser};

/// Opaque value returned by an authorization callback.
#[derive(Clone)]
pub struct AuthToken(Arc<dyn Any + Send + Sync>);

impl AuthToken {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrow the token as the type the callback stored.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthToken(..)")
    }
}

/// Outcome of the authorization gate.
#[derive(Debug, Clone, Default)]
pub enum Authorization {
    /// Gate not reached yet, or skipped (capabilities).
    #[default]
    Pending,
    /// No callback configured; every request passes.
    Anonymous,
    /// Callback accepted the request.
    Granted(AuthToken),
}

impl Authorization {
    pub fn is_evaluated(&self) -> bool {
        !matches!(self, Authorization::Pending)
    }

    pub fn token(&self) -> Option<&AuthToken> {
        match self {
            Authorization::Granted(token) => Some(token),
            _ => None,
        }
    }
}

/// Everything known about one request once its service is resolved.
pub struct RequestState {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Last path segment, letters only.
    pub endpoint: String,
    /// Path up to and including the final `/`.
    pub path_prefix: String,
    pub params: ParamTable,
    pub service: Service,
    pub operation: Option<Operation>,
    pub authorization: Authorization,
    /// Parsed POST body, `None` for GET.
    pub document: Option<Document>,
    pub options: Arc<DispatchOptions>,
    pub parser: Arc<dyn DocumentParser>,
}

impl RequestState {
    /// Public URL of this service endpoint, without query string.
    ///
    /// Honours `X-Forwarded-Proto`; header values are reduced to characters that
    /// are safe inside an XML attribute.
    pub fn service_url(&self) -> String {
        let proto = self
            .headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && v.bytes().all(|b| b.is_ascii_alphabetic()))
            .unwrap_or("http");

        let host = self
            .headers
            .get(axum::http::header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(|host| keep_chars(host, |c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']')))
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| "localhost".to_string());

        let prefix = keep_chars(&self.path_prefix, |c| {
            c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '.' | '_' | '~' | '%')
        });

        format!("{}://{}{}{}", proto, host, prefix, self.endpoint)
    }
}

impl fmt::Debug for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestState")
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .field("service", &self.service)
            .field("operation", &self.operation)
            .field("authorization", &self.authorization)
            .finish_non_exhaustive()
    }
}

fn keep_chars(value: &str, keep: impl Fn(char) -> bool) -> String {
    value.chars().filter(|c| keep(*c)).collect()
}
