//! Typed operation parameters.
//!
//! Handlers call `from_state` to get validated parameters instead of reading the
//! raw query table. Query parameters take precedence; POST documents fill the gaps.

use crate::dispatch::error::OwsError;
use crate::dispatch::state::RequestState;
use crate::protocol::srs::{BBox, Srs};
use crate::xml::{Envelope, Filter, XmlError};

/// WFS `DescribeFeatureType`.
#[derive(Debug, Clone, PartialEq)]
pub struct DescribeFeatureTypeParams {
    pub type_name: String,
}

impl DescribeFeatureTypeParams {
    pub fn from_state(state: &RequestState) -> Result<Self, OwsError> {
        let type_name = state
            .params
            .get_nonempty("typename")
            .ok_or_else(|| OwsError::missing_parameter("typeName"))?;
        Ok(Self {
            type_name: type_name.to_string(),
        })
    }
}

/// WFS `GetFeature`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetFeatureParams {
    pub type_names: Vec<String>,
    pub srs: Option<Srs>,
    pub bbox: Option<BBox>,
    pub filter: Option<Filter>,
    /// Already clamped to the configured maximum.
    pub max_features: u32,
}

impl GetFeatureParams {
    pub fn from_state(state: &RequestState) -> Result<Self, OwsError> {
        let params = &state.params;
        let body = state.document.as_ref().and_then(|doc| doc.as_get_feature());
        let query = body.and_then(|doc| doc.queries.first());

        let type_names: Vec<String> = match params.get_nonempty("typename") {
            Some(names) => split_list(names),
            None => body
                .map(|doc| doc.queries.iter().filter_map(|q| q.type_name.clone()).collect())
                .unwrap_or_default(),
        };
        if type_names.is_empty() {
            return Err(OwsError::missing_parameter("typeName"));
        }

        let srs_name = params
            .get_nonempty("srsname")
            .or_else(|| query.and_then(|q| q.srs_name.as_deref()));
        let srs = srs_name
            .map(|name| name.parse::<Srs>().map_err(|_| OwsError::invalid_parameter("srsName", name)))
            .transpose()?;

        let bbox = params
            .get_nonempty("bbox")
            .map(|value| value.parse::<BBox>().map_err(|_| OwsError::invalid_parameter("bbox", value)))
            .transpose()?;

        let filter = match params.get_nonempty("filter") {
            Some(expression) => Some(state.parser.parse_filter(expression).map_err(filter_error)?),
            None => query.and_then(|q| q.filter.clone()),
        };

        let requested = params
            .get_nonempty("maxfeatures")
            .or_else(|| body.and_then(|doc| doc.max_features.as_deref()));
        let max_features = match requested {
            Some(value) => parse_count(value)
                .ok_or_else(|| OwsError::invalid_parameter("maxFeatures", value))?
                .min(u64::from(state.options.max_features)) as u32,
            None => state.options.default_features,
        };

        Ok(Self {
            type_names,
            srs,
            bbox,
            filter,
            max_features,
        })
    }
}

/// WMS `GetMap`.
#[derive(Debug, Clone, PartialEq)]
pub struct GetMapParams {
    pub layers: Vec<String>,
    pub styles: Vec<String>,
    pub crs: Option<Srs>,
    pub bbox: Option<BBox>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
}

impl GetMapParams {
    pub fn from_state(state: &RequestState) -> Result<Self, OwsError> {
        let params = &state.params;
        let body = state.document.as_ref().and_then(|doc| doc.as_get_map());
        let output = body.and_then(|doc| doc.output.as_ref());

        let (layers, styles): (Vec<String>, Vec<String>) = match params.get_nonempty("layers") {
            Some(layers) => (
                split_list(layers),
                params
                    .get_nonempty("styles")
                    .map(|styles| styles.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default(),
            ),
            None => body
                .map(|doc| {
                    doc.layers
                        .iter()
                        .map(|l| (l.name.clone(), l.style.clone().unwrap_or_default()))
                        .unzip()
                })
                .unwrap_or_default(),
        };
        if layers.is_empty() {
            return Err(OwsError::missing_parameter("layers"));
        }

        // WMS 1.3 says crs, 1.1 says srs
        let (crs_key, crs_value) = match params.get_nonempty("crs") {
            Some(value) => ("crs", Some(value)),
            None => ("srs", params.get_nonempty("srs")),
        };
        let crs = crs_value
            .map(|value| value.parse::<Srs>().map_err(|_| OwsError::invalid_parameter(crs_key, value)))
            .transpose()?;

        let bbox = match params.get_nonempty("bbox") {
            Some(value) => {
                let mut bbox = value
                    .parse::<BBox>()
                    .map_err(|_| OwsError::invalid_parameter("bbox", value))?;
                bbox.srs = bbox.srs.or(crs);
                Some(bbox)
            }
            None => body
                .and_then(|doc| doc.bounding_box.as_ref())
                .map(envelope_bbox)
                .transpose()?,
        };

        let width = params
            .get_nonempty("width")
            .or_else(|| output.and_then(|o| o.width.as_deref()));
        let height = params
            .get_nonempty("height")
            .or_else(|| output.and_then(|o| o.height.as_deref()));
        let width = dimension(width, "width")?;
        let height = dimension(height, "height")?;
        let format = params
            .get_nonempty("format")
            .map(str::to_string)
            .or_else(|| output.and_then(|o| o.format.clone()));

        Ok(Self {
            layers,
            styles,
            crs,
            bbox,
            width,
            height,
            format,
        })
    }
}

/// WMTS `GetTile` (key-value encoding).
#[derive(Debug, Clone, PartialEq)]
pub struct GetTileParams {
    pub layer: String,
    pub style: Option<String>,
    pub tile_matrix_set: Option<String>,
    pub tile_matrix: Option<String>,
    pub tile_row: u32,
    pub tile_col: u32,
    pub format: Option<String>,
}

impl GetTileParams {
    pub fn from_state(state: &RequestState) -> Result<Self, OwsError> {
        let params = &state.params;
        let owned = |key: &str| params.get_nonempty(key).map(str::to_string);

        let layer = owned("layer").ok_or_else(|| OwsError::missing_parameter("Layer"))?;
        let tile_row = tile_index(params.get_nonempty("tilerow"), "TileRow")?;
        let tile_col = tile_index(params.get_nonempty("tilecol"), "TileCol")?;

        Ok(Self {
            layer,
            style: owned("style"),
            tile_matrix_set: owned("tilematrixset"),
            tile_matrix: owned("tilematrix"),
            tile_row,
            tile_col,
            format: owned("format"),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Non-negative decimal integer; saturates instead of overflowing.
fn parse_count(value: &str) -> Option<u64> {
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(value.parse().unwrap_or(u64::MAX))
}

fn dimension(value: Option<&str>, locator: &'static str) -> Result<Option<u32>, OwsError> {
    value
        .map(|v| {
            v.trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| OwsError::invalid_parameter(locator, v))
        })
        .transpose()
}

fn tile_index(value: Option<&str>, locator: &'static str) -> Result<u32, OwsError> {
    let value = value.ok_or_else(|| OwsError::missing_parameter(locator))?;
    value
        .trim()
        .parse()
        .map_err(|_| OwsError::invalid_parameter(locator, value))
}

fn envelope_bbox(envelope: &Envelope) -> Result<BBox, OwsError> {
    let srs = envelope
        .srs_name
        .as_deref()
        .map(|name| name.parse::<Srs>().map_err(|_| OwsError::invalid_parameter("srsName", name)))
        .transpose()?;
    BBox::from_corners(&envelope.lower_corner, &envelope.upper_corner, srs)
        .ok_or_else(|| OwsError::invalid_parameter("BoundingBox", "expected two-dimensional corners"))
}

fn filter_error(err: XmlError) -> OwsError {
    match err {
        XmlError::Unsupported(element) => {
            OwsError::unsupported_option("filter", format!("Unsupported filter {}", element))
        }
        other => {
            tracing::debug!(error = %other, "Rejecting filter parameter");
            OwsError::invalid_parameter("filter", "malformed filter expression")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::error::{ErrorKind, ExceptionCode};
    use crate::dispatch::state::tests::state_for;
    use crate::http::query::{parse_query, AllowList};
    use crate::protocol::Service;
    use crate::xml::parse_document;

    fn state(service: Service, query: &str) -> RequestState {
        state_for(service, parse_query(query, Some(&AllowList::ows())))
    }

    #[test]
    fn test_describe_feature_type_requires_type_name() {
        let err = DescribeFeatureTypeParams::from_state(&state(Service::Wfs, "")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exception(ExceptionCode::MissingParameter));
        assert_eq!(err.locator(), Some("typeName"));

        let params = DescribeFeatureTypeParams::from_state(&state(Service::Wfs, "TYPENAME=roads")).unwrap();
        assert_eq!(params.type_name, "roads");
    }

    #[test]
    fn test_get_feature_max_features() {
        let params = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a,b")).unwrap();
        assert_eq!(params.type_names, vec!["a", "b"]);
        assert_eq!(params.max_features, 1000);

        let params = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&maxfeatures=25")).unwrap();
        assert_eq!(params.max_features, 25);

        let params =
            GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&maxfeatures=99999999999999999999"))
                .unwrap();
        assert_eq!(params.max_features, 10000);

        let err = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&maxfeatures=-1")).unwrap_err();
        assert_eq!(err.locator(), Some("maxFeatures"));
        assert_eq!(err.message(), "Invalid parameter maxFeatures: -1");
    }

    #[test]
    fn test_get_feature_spatial_params() {
        let params = GetFeatureParams::from_state(&state(
            Service::Wfs,
            "typename=a&srsname=EPSG:4326&bbox=1,2,3,4,urn:ogc:def:crs:EPSG::3857",
        ))
        .unwrap();
        assert_eq!(params.srs.map(|s| s.epsg), Some(4326));
        let bbox = params.bbox.unwrap();
        assert_eq!((bbox.min_x, bbox.max_y), (1.0, 4.0));
        assert_eq!(bbox.srs.map(|s| s.epsg), Some(3857));

        let err = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&bbox=1,2,3")).unwrap_err();
        assert_eq!(err.locator(), Some("bbox"));

        let err = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&srsname=WGS84")).unwrap_err();
        assert_eq!(err.locator(), Some("srsName"));
    }

    #[test]
    fn test_get_feature_filter_param() {
        let filter = "%3CFilter%3E%3CBBOX%3E%3CEnvelope%3E%3ClowerCorner%3E0%200%3C/lowerCorner%3E\
                      %3CupperCorner%3E1%201%3C/upperCorner%3E%3C/Envelope%3E%3C/BBOX%3E%3C/Filter%3E";
        let params =
            GetFeatureParams::from_state(&state(Service::Wfs, &format!("typename=a&filter={}", filter))).unwrap();
        assert!(matches!(params.filter, Some(Filter::BBox(_))));

        let err = GetFeatureParams::from_state(&state(Service::Wfs, "typename=a&filter=%3CFilter%3E")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exception(ExceptionCode::InvalidParameter));
        assert_eq!(err.locator(), Some("filter"));

        let err = GetFeatureParams::from_state(&state(
            Service::Wfs,
            "typename=a&filter=%3CFilter%3E%3CWithin/%3E%3C/Filter%3E",
        ))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exception(ExceptionCode::UnsupportedOption));
    }

    #[test]
    fn test_get_feature_from_body() {
        let mut state = state(Service::Wfs, "");
        state.document = parse_document(
            br#"<GetFeature maxFeatures="5"><Query typeName="roads" srsName="EPSG:4326"/></GetFeature>"#,
        )
        .unwrap();

        let params = GetFeatureParams::from_state(&state).unwrap();
        assert_eq!(params.type_names, vec!["roads"]);
        assert_eq!(params.max_features, 5);
        assert_eq!(params.srs, Some(Srs { epsg: 4326, old_xy: true }));
    }

    #[test]
    fn test_get_map_params() {
        let params = GetMapParams::from_state(&state(
            Service::Wms,
            "layers=roads,rivers&styles=,blue&crs=EPSG:4326&bbox=0,0,10,10&width=256&height=256&format=image/png",
        ))
        .unwrap();
        assert_eq!(params.layers, vec!["roads", "rivers"]);
        assert_eq!(params.styles, vec!["", "blue"]);
        assert_eq!(params.bbox.and_then(|b| b.srs).map(|s| s.epsg), Some(4326));
        assert_eq!((params.width, params.height), (Some(256), Some(256)));
        assert_eq!(params.format.as_deref(), Some("image/png"));

        let err = GetMapParams::from_state(&state(Service::Wms, "format=image/png")).unwrap_err();
        assert_eq!(err.locator(), Some("layers"));

        let err = GetMapParams::from_state(&state(Service::Wms, "layers=a&width=0")).unwrap_err();
        assert_eq!(err.locator(), Some("width"));

        let err = GetMapParams::from_state(&state(Service::Wms, "layers=a&srs=bogus")).unwrap_err();
        assert_eq!(err.locator(), Some("srs"));
    }

    #[test]
    fn test_get_tile_params() {
        let params = GetTileParams::from_state(&state(
            Service::Wmts,
            "layer=base&tilematrixset=g&tilematrix=3&tilerow=2&tilecol=5",
        ))
        .unwrap();
        assert_eq!(params.layer, "base");
        assert_eq!((params.tile_row, params.tile_col), (2, 5));
        assert_eq!(params.tile_matrix.as_deref(), Some("3"));

        let err = GetTileParams::from_state(&state(Service::Wmts, "tilerow=1&tilecol=1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Exception(ExceptionCode::MissingParameter));
        assert_eq!(err.locator(), Some("Layer"));

        let err = GetTileParams::from_state(&state(Service::Wmts, "layer=a&tilerow=x&tilecol=1")).unwrap_err();
        assert_eq!(err.locator(), Some("TileRow"));
    }
}
