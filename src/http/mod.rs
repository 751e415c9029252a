//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, tracing span)
//!     → dispatcher (see crate::dispatch)
//!         → query.rs (query string → parameter table)
//!         → decoder.rs (Content-Encoding → decoded body stream)
//!     → response.rs (plain-text and streamed responses)
//!     → Send to client
//! ```

pub mod decoder;
pub mod query;
pub mod request;
pub mod response;
pub mod server;

pub use decoder::{decode_body, BodyStream, ContentCoding, UnsupportedEncoding};
pub use query::{parse_query, AllowList, ParamTable, Strictness, PLACEHOLDER};
pub use request::X_REQUEST_ID;
pub use server::HttpServer;
