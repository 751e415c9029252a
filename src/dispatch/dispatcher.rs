//! Request dispatcher.
//!
//! # Responsibilities
//! - Reject oversized request targets before any parsing
//! - Resolve endpoint, service and operation from the URL or the POST body
//! - Gate everything but capabilities behind the authorization callback
//! - Decode and parse POST bodies, then invoke exactly one operation handler
//! - Turn every failure, including handler panics, into a protocol response
//!
//! # Design Decisions
//! - An explicit `request` parameter always wins over the body's root element
//! - Authorization runs before any body byte is read
//! - Denied requests get 401 with a challenge, for GET and POST alike
//! - A dropped connection drops the request future, so processing stops at
//!   whichever await point is pending

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::FutureExt;

use crate::dispatch::auth::Authorizer;
use crate::dispatch::endpoint::{EndpointRoute, EndpointTable, RequestTarget};
use crate::dispatch::error::{ErrorKind, OwsError};
use crate::dispatch::options::DispatchOptions;
use crate::dispatch::state::{Authorization, RequestState};
use crate::dispatch::table::{OperationHandler, OperationTable, OperationTableBuilder};
use crate::http::decoder::decode_body;
use crate::http::query::{parse_query, AllowList};
use crate::observability::metrics;
use crate::protocol::{Operation, Service};
use crate::xml::{DocumentParser, XmlDocumentParser, XmlError};

/// Longest accepted request target (path plus query), in bytes.
pub const MAX_QUERY_LENGTH: usize = 65535;

struct DispatcherInner {
    operations: OperationTable,
    endpoints: Option<EndpointTable>,
    authorizer: Option<Authorizer>,
    parser: Arc<dyn DocumentParser>,
    options: Arc<DispatchOptions>,
    allow_list: AllowList,
}

/// Entry point for OWS requests. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("operations", &self.inner.operations)
            .field("endpoints", &self.inner.endpoints)
            .field("authorizer", &self.inner.authorizer.is_some())
            .field("options", &self.inner.options)
            .finish_non_exhaustive()
    }
}

/// What the pipeline resolved, kept for logs and metrics.
#[derive(Debug, Default)]
struct Resolved {
    service: Option<Service>,
    operation: Option<Operation>,
}

impl Dispatcher {
    pub fn builder(options: DispatchOptions) -> DispatcherBuilder {
        DispatcherBuilder {
            options,
            operations: OperationTable::builder(),
            endpoints: None,
            authorizer: None,
            parser: Arc::new(XmlDocumentParser),
        }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.inner.options
    }

    pub fn operations(&self) -> &OperationTable {
        &self.inner.operations
    }

    /// Handle one request. Never fails: errors are rendered as responses.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let mut resolved = Resolved::default();

        let outcome = AssertUnwindSafe(self.run(request, &mut resolved))
            .catch_unwind()
            .await;

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => {
                log_error(&err, &method, &resolved);
                metrics::record_rejection(err.kind().label());
                err.into_response()
            }
            Err(_) => {
                tracing::error!(
                    method = %method,
                    service = ?resolved.service,
                    operation = ?resolved.operation,
                    "Operation handler panicked"
                );
                metrics::record_rejection("panic");
                OwsError::unknown().into_response()
            }
        };

        metrics::record_request(
            resolved.service.map(|s| s.as_str()).unwrap_or("none"),
            resolved.operation.map(|op| op.as_str()).unwrap_or("none"),
            response.status().as_u16(),
            start,
        );
        response
    }

    async fn run(&self, request: Request<Body>, resolved: &mut Resolved) -> Result<Response, OwsError> {
        let inner = &*self.inner;

        // 1. Size guard
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        check_target_length(target)?;

        // 2-3. Split target, extract endpoint
        let target = RequestTarget::parse(target)?;

        // 4. Custom endpoint override
        if let Some(endpoints) = &inner.endpoints {
            match endpoints.get(&target.endpoint) {
                None => {
                    tracing::debug!(endpoint = %target.endpoint, "Endpoint not configured");
                    return Err(OwsError::status(StatusCode::NOT_FOUND));
                }
                Some(EndpointRoute::Custom(handler)) => {
                    tracing::debug!(endpoint = %target.endpoint, "Handing off to custom endpoint");
                    return Ok(handler(request).await);
                }
                Some(EndpointRoute::Allow) => {}
            }
        }

        // 5. Parameters
        let params = parse_query(&target.query, Some(&inner.allow_list));

        // 6. Service
        let service_name = params
            .get_nonempty("service")
            .unwrap_or(target.endpoint.as_str())
            .to_lowercase();
        let service = service_name
            .parse::<Service>()
            .ok()
            .filter(|service| inner.operations.serves(*service))
            .ok_or_else(|| OwsError::invalid_parameter("service", &service_name))?;
        resolved.service = Some(service);

        let requested = params.get_nonempty("request").map(str::to_lowercase);
        let (parts, body) = request.into_parts();
        let mut state = RequestState {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            endpoint: target.endpoint,
            path_prefix: target.path_prefix,
            params,
            service,
            operation: None,
            authorization: Authorization::Pending,
            document: None,
            options: inner.options.clone(),
            parser: inner.parser.clone(),
        };

        // 7-8. Explicit operation
        match &requested {
            Some(name) => {
                let operation = inner
                    .operations
                    .resolve(service, name)
                    .ok_or_else(|| OwsError::invalid_parameter("request", name))?;
                state.operation = Some(operation);
                resolved.operation = Some(operation);

                if operation.is_capabilities() {
                    tracing::debug!(service = %service, "Capabilities request, skipping authorization");
                    return self.invoke(operation, state).await;
                }
            }
            None if state.method != Method::POST => {
                return Err(OwsError::missing_parameter("request"));
            }
            None => {}
        }

        // 9. Authorization
        state.authorization = match &inner.authorizer {
            Some(authorize) => match authorize(&state).await {
                Some(token) => Authorization::Granted(token),
                None => {
                    tracing::info!(service = %service, endpoint = %state.endpoint, "Request not authorized");
                    return Err(OwsError::status(StatusCode::UNAUTHORIZED).with_realm(&inner.options.realm));
                }
            },
            None => Authorization::Anonymous,
        };

        // 10. Body
        if state.method == Method::POST {
            let stream = decode_body(&state.headers, body).map_err(|err| {
                tracing::debug!(error = %err, "Rejecting request body");
                OwsError::status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
            })?;
            state.document = inner
                .parser
                .parse_body(stream, inner.options.max_body_size)
                .await
                .map_err(body_error)?;
        }

        // 11. Inferred operation
        let operation = match state.operation {
            Some(operation) => operation,
            None => {
                let root = state
                    .document
                    .as_ref()
                    .map(|doc| doc.root_name().to_lowercase())
                    .filter(|root| !root.is_empty())
                    .ok_or_else(|| OwsError::missing_parameter("request"))?;
                let operation = inner
                    .operations
                    .resolve(service, &root)
                    .ok_or_else(|| OwsError::invalid_parameter("request", &root))?;
                tracing::debug!(operation = %operation, "Operation inferred from body");
                state.operation = Some(operation);
                resolved.operation = Some(operation);
                operation
            }
        };

        // 12. Dispatch
        self.invoke(operation, state).await
    }

    async fn invoke(&self, operation: Operation, state: RequestState) -> Result<Response, OwsError> {
        let handler: OperationHandler = self
            .inner
            .operations
            .get(operation)
            .cloned()
            .ok_or_else(|| OwsError::unsupported_operation(operation.protocol_name()))?;

        tracing::debug!(operation = %operation, endpoint = %state.endpoint, "Invoking operation handler");
        handler(state).await
    }
}

/// Bounds every later string operation on the target.
fn check_target_length(target: &str) -> Result<(), OwsError> {
    if target.len() > MAX_QUERY_LENGTH {
        return Err(OwsError::other("Query string is too long"));
    }
    Ok(())
}

fn body_error(err: XmlError) -> OwsError {
    match err {
        XmlError::TooLarge(_) => OwsError::status(StatusCode::PAYLOAD_TOO_LARGE),
        XmlError::Unsupported(element) => {
            let message = format!("Unsupported element {}", element);
            OwsError::unsupported_option(element, message)
        }
        XmlError::Body(err) => {
            tracing::debug!(error = %err, "Failed to read request body");
            OwsError::status(StatusCode::BAD_REQUEST).with_message("Unreadable request body")
        }
        other => OwsError::status(StatusCode::BAD_REQUEST).with_message(format!("Malformed XML body: {}", other)),
    }
}

fn log_error(err: &OwsError, method: &Method, resolved: &Resolved) {
    match err.kind() {
        ErrorKind::Status(status) if status.is_server_error() => tracing::warn!(
            method = %method,
            service = ?resolved.service,
            status = status.as_u16(),
            error = %err,
            "Request failed"
        ),
        kind => tracing::info!(
            method = %method,
            service = ?resolved.service,
            operation = ?resolved.operation,
            kind = kind.label(),
            locator = err.locator().unwrap_or(""),
            error = %err,
            "Request rejected"
        ),
    }
}

/// Collects handlers and collaborators for a [`Dispatcher`].
pub struct DispatcherBuilder {
    options: DispatchOptions,
    operations: OperationTableBuilder,
    endpoints: Option<EndpointTable>,
    authorizer: Option<Authorizer>,
    parser: Arc<dyn DocumentParser>,
}

impl DispatcherBuilder {
    pub fn operation(mut self, operation: Operation, handler: OperationHandler) -> Self {
        self.operations = self.operations.register(operation, handler);
        self
    }

    /// Restrict requests to the endpoints in `table`.
    pub fn endpoints(mut self, table: EndpointTable) -> Self {
        self.endpoints = Some(table);
        self
    }

    pub fn authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Replace the default quick-xml document parser.
    pub fn parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn build(self) -> Dispatcher {
        let operations = self.operations.build();
        tracing::info!(
            operations = operations.len(),
            endpoints = self.endpoints.as_ref().map(|e| e.len()),
            authorization = self.authorizer.is_some(),
            "Dispatcher ready"
        );

        Dispatcher {
            inner: Arc::new(DispatcherInner {
                operations,
                endpoints: self.endpoints,
                authorizer: self.authorizer,
                parser: self.parser,
                options: Arc::new(self.options),
                allow_list: AllowList::ows(),
            }),
        }
    }
}
