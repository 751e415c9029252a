//! Operation handler table.
//!
//! # Responsibilities
//! - Map typed operations to caller-supplied handlers
//! - Answer which services are served at all
//!
//! # Design Decisions
//! - Built once through [`OperationTableBuilder`], immutable afterwards
//! - Keys are typed [`Operation`] values, so a handler can only be registered
//!   for an operation of the service it belongs to

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::response::Response;
use futures_util::future::{BoxFuture, FutureExt};

use crate::dispatch::error::OwsError;
use crate::dispatch::state::RequestState;
use crate::protocol::{Operation, Service};

pub type HandlerFuture = BoxFuture<'static, Result<Response, OwsError>>;

/// Handler for one service operation. It writes the response itself.
pub type OperationHandler = Arc<dyn Fn(RequestState) -> HandlerFuture + Send + Sync>;

/// Wrap an async function as an [`OperationHandler`].
pub fn handler_fn<F, Fut>(f: F) -> OperationHandler
where
    F: Fn(RequestState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Response, OwsError>> + Send + 'static,
{
    Arc::new(move |state| f(state).boxed())
}

/// Read-only table of registered operations.
#[derive(Clone, Default)]
pub struct OperationTable {
    handlers: HashMap<Operation, OperationHandler>,
}

impl OperationTable {
    pub fn builder() -> OperationTableBuilder {
        OperationTableBuilder::default()
    }

    pub fn get(&self, operation: Operation) -> Option<&OperationHandler> {
        self.handlers.get(&operation)
    }

    /// True when at least one operation of `service` is registered.
    pub fn serves(&self, service: Service) -> bool {
        self.handlers.keys().any(|op| op.service() == service)
    }

    /// Resolve a request name within `service`, only if it is registered.
    pub fn resolve(&self, service: Service, name: &str) -> Option<Operation> {
        Operation::parse(service, name).filter(|op| self.handlers.contains_key(op))
    }

    pub fn operations(&self) -> impl Iterator<Item = Operation> + '_ {
        self.handlers.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for OperationTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.handlers.keys()).finish()
    }
}

#[derive(Default)]
pub struct OperationTableBuilder {
    handlers: HashMap<Operation, OperationHandler>,
}

impl OperationTableBuilder {
    /// Register `handler` for `operation`, replacing any earlier registration.
    pub fn register(mut self, operation: Operation, handler: OperationHandler) -> Self {
        if self.handlers.insert(operation, handler).is_some() {
            tracing::debug!(operation = %operation, "Replacing operation handler");
        }
        self
    }

    pub fn build(self) -> OperationTable {
        OperationTable {
            handlers: self.handlers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{WfsOperation, WmsOperation};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    fn ok_handler() -> OperationHandler {
        handler_fn(|_state| async { Ok(StatusCode::OK.into_response()) })
    }

    #[test]
    fn test_table_lookup() {
        let table = OperationTable::builder()
            .register(Operation::Wfs(WfsOperation::GetCapabilities), ok_handler())
            .register(Operation::Wfs(WfsOperation::GetFeature), ok_handler())
            .build();

        assert_eq!(table.len(), 2);
        assert!(table.serves(Service::Wfs));
        assert!(!table.serves(Service::Wms));
        assert_eq!(
            table.resolve(Service::Wfs, "GETFEATURE"),
            Some(Operation::Wfs(WfsOperation::GetFeature))
        );
        assert_eq!(table.resolve(Service::Wfs, "describefeaturetype"), None);
        assert!(table.get(Operation::Wms(WmsOperation::GetMap)).is_none());
    }
}
