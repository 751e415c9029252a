//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → dispatcher.rs: size guard (MAX_QUERY_LENGTH)
//!     → endpoint.rs: split target, endpoint table (404 / custom / allow)
//!     → http::query: parameter table (allow-list, sanitizing)
//!     → table.rs: resolve service, explicit operation
//!         → capabilities: handler, no authorization
//!     → auth.rs: authorization callback (401 + challenge on denial)
//!     → http::decoder + xml: decode and parse POST body
//!     → table.rs: infer operation from the body root
//!     → operation handler (state.rs: RequestState)
//!     → error.rs: exception report or raw status on any failure
//! ```
//!
//! # Design Decisions
//! - Exactly one outcome per request: a handler response or an error response
//! - Handler panics are contained and reported as NoApplicableCode
//! - Tables and options are immutable after the dispatcher is built

pub mod auth;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod options;
pub mod state;
pub mod table;

pub use auth::{authorizer_fn, bearer_token, Authorizer, BearerPrincipal};
pub use dispatcher::{Dispatcher, DispatcherBuilder, MAX_QUERY_LENGTH};
pub use endpoint::{endpoint_fn, EndpointHandler, EndpointRoute, EndpointTable, RequestTarget};
pub use error::{ErrorKind, ExceptionCode, OwsError};
pub use handlers::static_document;
pub use options::DispatchOptions;
pub use state::{AuthToken, Authorization, RequestState};
pub use table::{handler_fn, HandlerFuture, OperationHandler, OperationTable};
