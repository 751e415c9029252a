//! OWS Gateway Library
//!
//! Request dispatch and validation for OGC Web Feature, Web Map and Web Map
//! Tile Service requests, served through axum.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod xml;

pub use config::GatewayConfig;
pub use dispatch::{Dispatcher, OwsError, RequestState};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
