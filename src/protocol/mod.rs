//! OWS protocol vocabulary.
//!
//! # Data Flow
//! ```text
//! service / request names → service.rs (typed Service, Operation)
//! srs, bbox values        → srs.rs (Srs, BBox)
//! RequestState            → params.rs (validated per-operation parameters)
//! ```

pub mod params;
pub mod service;
pub mod srs;

pub use params::{DescribeFeatureTypeParams, GetFeatureParams, GetMapParams, GetTileParams};
pub use service::{Operation, Service, UnknownService, WfsOperation, WmsOperation, WmtsOperation};
pub use srs::{BBox, SpatialParseError, Srs};
