//! Spatial reference and bounding box parameters.
//!
//! # Responsibilities
//! - Recognise EPSG codes in their old-style, URL and URN spellings
//! - Parse `minx,miny,maxx,maxy[,crs]` bounding boxes
//!
//! # Design Decisions
//! - Old-style spellings (`EPSG:n`, the `epsg.xml#n` URL) keep x/y axis order;
//!   URN spellings use the authority's axis order, flagged via `old_xy`
//! - Numbers are bounded in length so hostile input stays cheap to reject

use std::fmt;
use std::str::FromStr;

const URL_PREFIX: &str = "http://www.opengis.net/gml/srs/epsg.xml#";

/// An EPSG coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Srs {
    pub epsg: u32,
    /// Coordinates are given as x,y even for lat/lon systems.
    pub old_xy: bool,
}

impl Srs {
    pub fn new(epsg: u32) -> Self {
        Self { epsg, old_xy: false }
    }
}

impl fmt::Display for Srs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.old_xy {
            write!(f, "EPSG:{}", self.epsg)
        } else {
            write!(f, "urn:ogc:def:crs:EPSG::{}", self.epsg)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpatialParseError {
    #[error("unrecognised coordinate reference system")]
    Srs,
    #[error("expected four coordinates")]
    Coordinates,
    #[error("invalid number")]
    Number,
}

impl FromStr for Srs {
    type Err = SpatialParseError;

    /// Accepts e.g. `EPSG:4326`, `urn:ogc:def:crs:EPSG::4326`,
    /// `urn:x-ogc:def:crs:epsg:6.11.2:4326` or the GML `epsg.xml#4326` URL.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();

        let (code, old_xy) = if let Some(code) = lower.strip_prefix("epsg:") {
            (code, true)
        } else if let Some(code) = lower.strip_prefix(URL_PREFIX) {
            (code, true)
        } else if let Some(rest) = lower
            .strip_prefix("urn:ogc:def:crs:epsg:")
            .or_else(|| lower.strip_prefix("urn:x-ogc:def:crs:epsg:"))
        {
            let (version, code) = rest.split_once(':').ok_or(SpatialParseError::Srs)?;
            if !version.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
                return Err(SpatialParseError::Srs);
            }
            (code, false)
        } else {
            return Err(SpatialParseError::Srs);
        };

        if code.is_empty() || code.len() > 8 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(SpatialParseError::Srs);
        }
        let epsg = code.parse().map_err(|_| SpatialParseError::Srs)?;
        Ok(Self { epsg, old_xy })
    }
}

/// Axis-aligned bounding box with an optional SRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
    pub srs: Option<Srs>,
}

impl BBox {
    /// Build from lower and upper corners as found in GML envelopes.
    pub fn from_corners(lower: &[f64], upper: &[f64], srs: Option<Srs>) -> Option<Self> {
        match (lower, upper) {
            ([min_x, min_y], [max_x, max_y]) => Some(Self {
                min_x: *min_x,
                min_y: *min_y,
                max_x: *max_x,
                max_y: *max_y,
                srs,
            }),
            _ => None,
        }
    }
}

impl FromStr for BBox {
    type Err = SpatialParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(5, ',');
        let mut coords = [0f64; 4];
        for coord in coords.iter_mut() {
            let part = parts.next().ok_or(SpatialParseError::Coordinates)?;
            *coord = parse_number(part)?;
        }

        let srs = match parts.next() {
            Some(srs) => Some(srs.parse()?),
            None => None,
        };

        Ok(Self {
            min_x: coords[0],
            min_y: coords[1],
            max_x: coords[2],
            max_y: coords[3],
            srs,
        })
    }
}

/// Parse a decimal number of bounded length.
pub fn parse_number(s: &str) -> Result<f64, SpatialParseError> {
    let s = s.trim();
    if s.is_empty() || s.len() > 70 {
        return Err(SpatialParseError::Number);
    }
    if !s.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'-' | b'+' | b'.' | b'e' | b'E')) {
        return Err(SpatialParseError::Number);
    }
    s.parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or(SpatialParseError::Number)
}
