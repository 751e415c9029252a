//! XML request bodies.
//!
//! # Data Flow
//! ```text
//! decoded BodyStream
//!     → parser.rs (bounded read, quick-xml tree, depth limit)
//!     → document.rs (GetFeature / GetMap envelopes, or root name only)
//!     → RequestState.document
//! ```
//!
//! # Design Decisions
//! - The parser sits behind the `DocumentParser` trait so callers can swap it
//! - DTDs and entity references are never expanded

pub mod document;
pub mod parser;

pub use document::{
    Document, Envelope, FeatureQuery, Filter, GetFeatureDocument, GetMapDocument, MapOutput, NamedLayer,
};
pub use parser::{parse_document, DocumentParser, XmlDocumentParser, XmlError};
