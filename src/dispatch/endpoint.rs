//! Custom endpoint table and request target splitting.
//!
//! # Responsibilities
//! - Split the request target into path prefix, endpoint and query
//! - Reduce the endpoint to letters so it is safe in headers and documents
//! - Look up optional per-endpoint overrides
//!
//! # Design Decisions
//! - When a table is configured it is exhaustive: unknown endpoints are 404
//! - An `Allow` entry runs the normal protocol pipeline
//! - A `Custom` entry receives the raw request and bypasses the pipeline

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use futures_util::future::{BoxFuture, FutureExt};

use crate::dispatch::error::OwsError;
use crate::http::query::{decode, PLACEHOLDER};

/// Handler that owns the whole exchange for its endpoint.
pub type EndpointHandler = Arc<dyn Fn(Request<Body>) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function as an [`EndpointHandler`].
pub fn endpoint_fn<F, Fut>(f: F) -> EndpointHandler
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |request| f(request).boxed())
}

#[derive(Clone)]
pub enum EndpointRoute {
    /// Run the default protocol pipeline.
    Allow,
    /// Hand the request to a custom handler.
    Custom(EndpointHandler),
}

impl std::fmt::Debug for EndpointRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndpointRoute::Allow => f.write_str("Allow"),
            EndpointRoute::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Endpoint names mapped to their route.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    routes: HashMap<String, EndpointRoute>,
}

impl EndpointTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from boolean flags; `false` entries are left out and therefore 404.
    pub fn from_flags<'a>(flags: impl IntoIterator<Item = (&'a String, &'a bool)>) -> Self {
        flags
            .into_iter()
            .filter(|(_, allowed)| **allowed)
            .fold(Self::new(), |table, (name, _)| table.allow(name.clone()))
    }

    pub fn allow(mut self, endpoint: impl Into<String>) -> Self {
        self.routes.insert(endpoint.into(), EndpointRoute::Allow);
        self
    }

    pub fn custom(mut self, endpoint: impl Into<String>, handler: EndpointHandler) -> Self {
        self.routes.insert(endpoint.into(), EndpointRoute::Custom(handler));
        self
    }

    pub fn get(&self, endpoint: &str) -> Option<&EndpointRoute> {
        self.routes.get(endpoint)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A request target split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTarget {
    /// Everything up to and including the last `/` before the query.
    pub path_prefix: String,
    /// Decoded final path segment, letters only.
    pub endpoint: String,
    /// Raw query string after `?`, empty when absent.
    pub query: String,
}

impl RequestTarget {
    /// Split `target` (`/path/endpoint?query`).
    ///
    /// Fails with 404 when there is no `/` before the query.
    pub fn parse(target: &str) -> Result<Self, OwsError> {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let slash = path.rfind('/').ok_or_else(|| OwsError::status(StatusCode::NOT_FOUND))?;

        let endpoint = decode(&path[slash + 1..])
            .chars()
            .map(|c| if c.is_ascii_alphabetic() { c } else { PLACEHOLDER })
            .collect();

        Ok(Self {
            path_prefix: path[..=slash].to_string(),
            endpoint,
            query: query.to_string(),
        })
    }
}
