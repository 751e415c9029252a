//! XML body and filter parsing.
//!
//! # Responsibilities
//! - Read a decoded body stream up to a byte limit
//! - Build an element tree with quick-xml, namespaces reduced to local names
//! - Map recognised envelopes (GetFeature, GetMap, Filter) to typed documents
//!
//! # Design Decisions
//! - The parser is a trait object so deployments can swap in a schema-aware one
//! - Entities other than the XML predefined ones are never expanded
//! - Nesting depth is bounded; request envelopes are shallow

use std::io;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, StreamExt};
use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::http::decoder::BodyStream;
use crate::protocol::srs::parse_number;
use crate::xml::document::{
    Document, Envelope, FeatureQuery, Filter, GetFeatureDocument, GetMapDocument, MapOutput,
    NamedLayer,
};

/// Deepest element nesting accepted in a request body.
const MAX_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum XmlError {
    #[error("malformed XML: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error("malformed XML attribute: {0}")]
    Attribute(#[from] AttrError),

    #[error("unexpected end of document")]
    Truncated,

    #[error("elements nested too deeply")]
    TooDeep,

    #[error("body larger than {0} bytes")]
    TooLarge(usize),

    #[error("failed to read body: {0}")]
    Body(#[from] io::Error),

    #[error("expected <{0}> root element")]
    UnexpectedRoot(&'static str),

    #[error("invalid value in <{0}>")]
    Value(&'static str),

    #[error("unsupported element <{0}>")]
    Unsupported(String),
}

/// Turns request bodies and filter expressions into typed documents.
pub trait DocumentParser: Send + Sync {
    /// Parse a POST body. `Ok(None)` means the body had no root element.
    fn parse_body(
        &self,
        body: BodyStream,
        limit: usize,
    ) -> BoxFuture<'static, Result<Option<Document>, XmlError>>;

    /// Parse a standalone `<Filter>` expression, as passed in the `filter` parameter.
    fn parse_filter(&self, expression: &str) -> Result<Filter, XmlError>;
}

/// Default [`DocumentParser`] backed by quick-xml.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlDocumentParser;

impl DocumentParser for XmlDocumentParser {
    fn parse_body(
        &self,
        body: BodyStream,
        limit: usize,
    ) -> BoxFuture<'static, Result<Option<Document>, XmlError>> {
        async move {
            let bytes = read_limited(body, limit).await?;
            parse_document(&bytes)
        }
        .boxed()
    }

    fn parse_filter(&self, expression: &str) -> Result<Filter, XmlError> {
        let root = parse_tree(expression.as_bytes())?.ok_or(XmlError::UnexpectedRoot("Filter"))?;
        if root.name != "Filter" {
            return Err(XmlError::UnexpectedRoot("Filter"));
        }
        build_filter(&root)
    }
}

/// Parse a complete document held in memory.
pub fn parse_document(xml: &[u8]) -> Result<Option<Document>, XmlError> {
    match parse_tree(xml)? {
        Some(root) => build_document(root).map(Some),
        None => Ok(None),
    }
}

async fn read_limited(mut body: BodyStream, limit: usize) -> Result<Vec<u8>, XmlError> {
    let mut buf = Vec::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if buf.len() + chunk.len() > limit {
            return Err(XmlError::TooLarge(limit));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

#[derive(Debug, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self, XmlError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            attributes.push((key, attr.unescape_value()?.into_owned()));
        }
        Ok(Self {
            name,
            attributes,
            ..Self::default()
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    fn child_text(&self, name: &str) -> Option<String> {
        self.child(name).map(|child| child.text.trim().to_string())
    }

    /// First descendant named `name`, depth first.
    fn find(&self, name: &str) -> Option<&Element> {
        self.children
            .iter()
            .find_map(|child| if child.name == name { Some(child) } else { child.find(name) })
    }
}

fn parse_tree(xml: &[u8]) -> Result<Option<Element>, XmlError> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(XmlError::TooDeep);
                }
                stack.push(Element::from_start(&start)?);
            }
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                attach(&mut stack, &mut root, element);
            }
            Event::End(_) => {
                let element = stack.pop().ok_or(XmlError::Truncated)?;
                attach(&mut stack, &mut root, element);
            }
            Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(XmlError::Truncated);
    }
    Ok(root)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        // Only the first top-level element counts.
        None => {
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

fn build_document(root: Element) -> Result<Document, XmlError> {
    match root.name.as_str() {
        "GetFeature" => {
            let queries = root
                .children_named("Query")
                .map(build_query)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Document::GetFeature(GetFeatureDocument {
                max_features: root.attr("maxFeatures").map(str::to_string),
                service: root.attr("service").map(str::to_string),
                queries,
            }))
        }
        "GetMap" => Ok(Document::GetMap(build_get_map(&root)?)),
        _ => Ok(Document::Other { root: root.name }),
    }
}

fn build_query(query: &Element) -> Result<FeatureQuery, XmlError> {
    Ok(FeatureQuery {
        srs_name: query.attr("srsName").map(str::to_string),
        type_name: query.attr("typeName").map(str::to_string),
        filter: query.child("Filter").map(build_filter).transpose()?,
    })
}

fn build_filter(filter: &Element) -> Result<Filter, XmlError> {
    let predicate = filter.children.first().ok_or(XmlError::Value("Filter"))?;
    let envelope = || {
        predicate
            .find("Envelope")
            .ok_or(XmlError::Value("Envelope"))
            .and_then(build_envelope)
    };

    match predicate.name.as_str() {
        "BBOX" => Ok(Filter::BBox(envelope()?)),
        "Intersects" => Ok(Filter::Intersects(envelope()?)),
        other => Err(XmlError::Unsupported(other.to_string())),
    }
}

fn build_envelope(envelope: &Element) -> Result<Envelope, XmlError> {
    let lower = envelope.child("lowerCorner").ok_or(XmlError::Value("Envelope"))?;
    let upper = envelope.child("upperCorner").ok_or(XmlError::Value("Envelope"))?;
    Ok(Envelope {
        srs_name: envelope.attr("srsName").map(str::to_string),
        lower_corner: parse_corner(&lower.text, "lowerCorner")?,
        upper_corner: parse_corner(&upper.text, "upperCorner")?,
    })
}

fn parse_corner(text: &str, element: &'static str) -> Result<Vec<f64>, XmlError> {
    let coords = text
        .split_whitespace()
        .map(parse_number)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| XmlError::Value(element))?;
    if coords.len() != 2 {
        return Err(XmlError::Value(element));
    }
    Ok(coords)
}

fn build_get_map(root: &Element) -> Result<GetMapDocument, XmlError> {
    let layers = root
        .child("StyledLayerDescriptor")
        .map(|sld| {
            sld.children_named("NamedLayer")
                .map(|layer| NamedLayer {
                    name: layer.child_text("Name").unwrap_or_default(),
                    style: layer.child("NamedStyle").and_then(|style| style.child_text("Name")),
                })
                .collect()
        })
        .unwrap_or_default();

    let bounding_box = root.child("BoundingBox").map(build_bounding_box).transpose()?;

    let output = root.child("Output").map(|output| {
        let size = output.child("Size");
        MapOutput {
            format: output.child_text("Format"),
            width: size.and_then(|s| s.child_text("Width")),
            height: size.and_then(|s| s.child_text("Height")),
        }
    });

    Ok(GetMapDocument {
        layers,
        bounding_box,
        output,
    })
}

/// `<BoundingBox>` holds either GML 3 corners or two GML 2 `<coord>` points.
fn build_bounding_box(bbox: &Element) -> Result<Envelope, XmlError> {
    if bbox.child("lowerCorner").is_some() {
        return build_envelope(bbox);
    }

    let points = bbox
        .children_named("coord")
        .map(|coord| {
            let x = coord.child("X").ok_or(XmlError::Value("coord"))?;
            let y = coord.child("Y").ok_or(XmlError::Value("coord"))?;
            let x = parse_number(&x.text).map_err(|_| XmlError::Value("X"))?;
            let y = parse_number(&y.text).map_err(|_| XmlError::Value("Y"))?;
            Ok(vec![x, y])
        })
        .collect::<Result<Vec<_>, XmlError>>()?;

    match <[Vec<f64>; 2]>::try_from(points) {
        Ok([lower_corner, upper_corner]) => Ok(Envelope {
            srs_name: bbox.attr("srsName").map(str::to_string),
            lower_corner,
            upper_corner,
        }),
        Err(_) => Err(XmlError::Value("BoundingBox")),
    }
}
