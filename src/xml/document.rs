//! Typed request envelopes.
//!
//! Only the shapes the gateway understands are modelled. Any other root element
//! is kept by name so the operation can still be inferred from it.

/// GML envelope: two corners and an optional SRS name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    pub srs_name: Option<String>,
    pub lower_corner: Vec<f64>,
    pub upper_corner: Vec<f64>,
}

/// Spatial filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    BBox(Envelope),
    Intersects(Envelope),
}

impl Filter {
    pub fn envelope(&self) -> &Envelope {
        match self {
            Filter::BBox(envelope) | Filter::Intersects(envelope) => envelope,
        }
    }
}

/// `<Query>` inside a WFS `GetFeature`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureQuery {
    pub srs_name: Option<String>,
    pub type_name: Option<String>,
    pub filter: Option<Filter>,
}

/// WFS `GetFeature` POST body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetFeatureDocument {
    pub max_features: Option<String>,
    pub service: Option<String>,
    pub queries: Vec<FeatureQuery>,
}

/// `<NamedLayer>` of a styled layer descriptor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NamedLayer {
    pub name: String,
    pub style: Option<String>,
}

/// `<Output>` of a WMS `GetMap`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MapOutput {
    pub format: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
}

/// WMS `GetMap` POST body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GetMapDocument {
    pub layers: Vec<NamedLayer>,
    pub bounding_box: Option<Envelope>,
    pub output: Option<MapOutput>,
}

/// A parsed POST body.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    GetFeature(GetFeatureDocument),
    GetMap(GetMapDocument),
    /// Root element without a dedicated shape, e.g. `GetCapabilities`.
    Other { root: String },
}

impl Document {
    /// Local name of the root element, used to infer the operation.
    pub fn root_name(&self) -> &str {
        match self {
            Document::GetFeature(_) => "GetFeature",
            Document::GetMap(_) => "GetMap",
            Document::Other { root } => root,
        }
    }

    pub fn as_get_feature(&self) -> Option<&GetFeatureDocument> {
        match self {
            Document::GetFeature(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_get_map(&self) -> Option<&GetMapDocument> {
        match self {
            Document::GetMap(doc) => Some(doc),
            _ => None,
        }
    }
}
