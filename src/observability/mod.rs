//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher and HTTP layers produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (request counters, latency histograms, rejections)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log events via the TraceLayer span
//! - Metrics are cheap (atomic increments); without an installed
//!   recorder they are no-ops, so tests need no setup

pub mod logging;
pub mod metrics;
