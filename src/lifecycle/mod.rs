//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build dispatcher → Start listener
//!
//! Shutdown (shutdown.rs):
//!     Ctrl+C received → Stop accepting → Drain in-flight requests → Exit
//! ```

pub mod shutdown;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_dispatcher, StartupError};
