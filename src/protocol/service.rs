//! Typed service and operation names.
//!
//! Operations are nested per service, so registering e.g. a `GetTile` handler under
//! WFS cannot be expressed.

use std::fmt;
use std::str::FromStr;

/// Protocol family of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Service {
    Wfs,
    Wms,
    Wmts,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Wfs, Service::Wms, Service::Wmts];

    /// Lower-case name, as compared against the `service` parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Wfs => "wfs",
            Service::Wms => "wms",
            Service::Wmts => "wmts",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name is not one of the known services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown service: {0}")]
pub struct UnknownService(pub String);

impl FromStr for Service {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Service::ALL
            .into_iter()
            .find(|service| service.as_str() == lower)
            .ok_or(UnknownService(lower))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WfsOperation {
    GetCapabilities,
    DescribeFeatureType,
    GetFeature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WmsOperation {
    GetCapabilities,
    GetMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WmtsOperation {
    GetCapabilities,
    GetTile,
}

/// An operation, tagged with the service it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Wfs(WfsOperation),
    Wms(WmsOperation),
    Wmts(WmtsOperation),
}

impl Operation {
    /// Every operation known for `service`.
    pub fn all(service: Service) -> &'static [Operation] {
        match service {
            Service::Wfs => &[
                Operation::Wfs(WfsOperation::GetCapabilities),
                Operation::Wfs(WfsOperation::DescribeFeatureType),
                Operation::Wfs(WfsOperation::GetFeature),
            ],
            Service::Wms => &[
                Operation::Wms(WmsOperation::GetCapabilities),
                Operation::Wms(WmsOperation::GetMap),
            ],
            Service::Wmts => &[
                Operation::Wmts(WmtsOperation::GetCapabilities),
                Operation::Wmts(WmtsOperation::GetTile),
            ],
        }
    }

    /// Resolve a request name (any case) within `service`.
    pub fn parse(service: Service, name: &str) -> Option<Operation> {
        let lower = name.to_ascii_lowercase();
        Self::all(service)
            .iter()
            .copied()
            .find(|op| op.as_str() == lower)
    }

    pub fn service(&self) -> Service {
        match self {
            Operation::Wfs(_) => Service::Wfs,
            Operation::Wms(_) => Service::Wms,
            Operation::Wmts(_) => Service::Wmts,
        }
    }

    /// Lower-case request name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Wfs(WfsOperation::GetCapabilities)
            | Operation::Wms(WmsOperation::GetCapabilities)
            | Operation::Wmts(WmtsOperation::GetCapabilities) => "getcapabilities",
            Operation::Wfs(WfsOperation::DescribeFeatureType) => "describefeaturetype",
            Operation::Wfs(WfsOperation::GetFeature) => "getfeature",
            Operation::Wms(WmsOperation::GetMap) => "getmap",
            Operation::Wmts(WmtsOperation::GetTile) => "gettile",
        }
    }

    /// Protocol spelling, used in exception locators.
    pub fn protocol_name(&self) -> &'static str {
        match self {
            Operation::Wfs(WfsOperation::GetCapabilities)
            | Operation::Wms(WmsOperation::GetCapabilities)
            | Operation::Wmts(WmtsOperation::GetCapabilities) => "GetCapabilities",
            Operation::Wfs(WfsOperation::DescribeFeatureType) => "DescribeFeatureType",
            Operation::Wfs(WfsOperation::GetFeature) => "GetFeature",
            Operation::Wms(WmsOperation::GetMap) => "GetMap",
            Operation::Wmts(WmtsOperation::GetTile) => "GetTile",
        }
    }

    /// Capabilities requests skip authorization and body parsing.
    pub fn is_capabilities(&self) -> bool {
        self.as_str() == "getcapabilities"
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service(), self.as_str())
    }
}
