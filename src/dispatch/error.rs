//! Protocol error model.
//!
//! # Responsibilities
//! - Represent every pipeline failure as {kind, locator, message}
//! - Generate default messages from kind and locator
//! - Render errors as OWS exception reports or raw status responses
//!
//! # Design Decisions
//! - Semantic (protocol) errors are reported inside HTTP 200, per OWS convention
//! - Transport errors use real HTTP status codes with a plain-text body
//! - Locator and message are escaped before they reach the XML envelope

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use quick_xml::escape::escape;

use crate::http::response::text_response;

/// Realm sent in `WWW-Authenticate` when no other realm is configured.
pub const DEFAULT_REALM: &str = "ows-gateway";

/// The five named OWS exception kinds, numbered as on the wire of older clients.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    UnsupportedOperation = 0,
    MissingParameter = 1,
    InvalidParameter = 2,
    UnsupportedOption = 3,
    Other = 4,
}

impl ExceptionCode {
    /// Protocol-defined `exceptionCode` attribute value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionCode::UnsupportedOperation => "OperationNotSupported",
            ExceptionCode::MissingParameter => "MissingParameterValue",
            ExceptionCode::InvalidParameter => "InvalidParameterValue",
            ExceptionCode::UnsupportedOption => "OptionNotSupported",
            ExceptionCode::Other => "NoApplicableCode",
        }
    }

    fn from_u16(code: u16) -> Option<Self> {
        match code {
            0 => Some(ExceptionCode::UnsupportedOperation),
            1 => Some(ExceptionCode::MissingParameter),
            2 => Some(ExceptionCode::InvalidParameter),
            3 => Some(ExceptionCode::UnsupportedOption),
            4 => Some(ExceptionCode::Other),
            _ => None,
        }
    }
}

/// Either a named exception or a raw HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Exception(ExceptionCode),
    Status(StatusCode),
}

impl ErrorKind {
    /// Short label used for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Exception(code) => code.as_str(),
            ErrorKind::Status(_) => "HttpStatus",
        }
    }
}

/// A failure anywhere in the request pipeline or inside an operation handler.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OwsError {
    kind: ErrorKind,
    locator: Option<String>,
    message: String,
    realm: Option<String>,
}

impl OwsError {
    /// Operation exists in the protocol but is not served here.
    pub fn unsupported_operation(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self::exception(
            ExceptionCode::UnsupportedOperation,
            format!("Unsupported operation {}", operation),
            Some(operation),
        )
    }

    pub fn missing_parameter(name: impl Into<String>) -> Self {
        let name = name.into();
        Self::exception(
            ExceptionCode::MissingParameter,
            format!("Missing parameter {}", name),
            Some(name),
        )
    }

    /// `detail` is usually the offending value.
    pub fn invalid_parameter(name: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        let name = name.into();
        Self::exception(
            ExceptionCode::InvalidParameter,
            format!("Invalid parameter {}: {}", name, detail),
            Some(name),
        )
    }

    pub fn unsupported_option(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::exception(ExceptionCode::UnsupportedOption, message.into(), Some(name.into()))
    }

    /// Catch-all semantic error without a locator.
    pub fn other(message: impl Into<String>) -> Self {
        Self::exception(ExceptionCode::Other, message.into(), None)
    }

    /// Failure with no usable detail, e.g. a panicking handler.
    pub fn unknown() -> Self {
        Self::other("Unknown error")
    }

    /// Raw HTTP status, message defaults to the canonical reason phrase.
    pub fn status(status: StatusCode) -> Self {
        Self {
            kind: ErrorKind::Status(status),
            locator: None,
            message: status.canonical_reason().unwrap_or("Error").to_string(),
            realm: None,
        }
    }

    /// Build from a numeric code: 0..=4 are named kinds, anything above is an HTTP status.
    ///
    /// Codes that are not valid HTTP statuses become 500. An explicit message replaces the
    /// generated one except for `invalidParameter`, where it becomes the detail.
    pub fn from_code(code: u16, locator: Option<&str>, message: Option<&str>) -> Self {
        let locator_text = locator.unwrap_or("");
        let mut err = match ExceptionCode::from_u16(code) {
            Some(ExceptionCode::UnsupportedOperation) => Self::unsupported_operation(locator_text),
            Some(ExceptionCode::MissingParameter) => Self::missing_parameter(locator_text),
            Some(ExceptionCode::InvalidParameter) => {
                return Self::invalid_parameter(locator_text, message.unwrap_or(""))
                    .with_locator_opt(locator);
            }
            Some(ExceptionCode::UnsupportedOption) => {
                Self::unsupported_option(locator_text, message.unwrap_or("Unknown error"))
            }
            Some(ExceptionCode::Other) => Self::other(message.unwrap_or("Unknown error")),
            None => Self::status(
                StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ),
        };
        if let Some(message) = message {
            err.message = message.to_string();
        }
        err.with_locator_opt(locator)
    }

    fn exception(code: ExceptionCode, message: String, locator: Option<String>) -> Self {
        Self {
            kind: ErrorKind::Exception(code),
            locator,
            message,
            realm: None,
        }
    }

    fn with_locator_opt(mut self, locator: Option<&str>) -> Self {
        self.locator = locator.map(str::to_string);
        self
    }

    /// Replace the message, keeping kind and locator.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Realm for the `WWW-Authenticate` challenge of a 401.
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn locator(&self) -> Option<&str> {
        self.locator.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Render the exception report envelope. Only meaningful for named kinds.
    pub fn exception_report(&self) -> String {
        let code = match self.kind {
            ErrorKind::Exception(code) => code.as_str(),
            ErrorKind::Status(_) => ExceptionCode::Other.as_str(),
        };
        let locator = match &self.locator {
            Some(locator) if !locator.is_empty() => format!(" locator=\"{}\"", escape(locator.as_str())),
            _ => String::new(),
        };

        format!(
            concat!(
                "<?xml version=\"1.0\" encoding=\"UTF-8\"?>",
                "<ows:ExceptionReport",
                " xmlns:ows=\"http://www.opengis.net/ows\"",
                " xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\"",
                " version=\"1.0.0\"",
                " xsi:schemaLocation=\"http://www.opengis.net/ows\"",
                ">",
                "<ows:Exception exceptionCode=\"{code}\"{locator}>",
                "<ows:ExceptionText>{text}</ows:ExceptionText>",
                "</ows:Exception>",
                "</ows:ExceptionReport>",
            ),
            code = code,
            locator = locator,
            text = escape(self.message.as_str()),
        )
    }
}

impl IntoResponse for OwsError {
    fn into_response(self) -> Response {
        match self.kind {
            ErrorKind::Status(status) => {
                let body = format!("{} {}", status.as_u16(), self.message);
                let mut response = text_response(status, "text/plain", body);
                if status == StatusCode::UNAUTHORIZED {
                    let realm = self.realm.as_deref().unwrap_or(DEFAULT_REALM);
                    let challenge = format!("Basic realm=\"{}\"", realm.replace('"', ""));
                    if let Ok(value) = HeaderValue::from_str(&challenge) {
                        response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
                    }
                }
                response
            }
            ErrorKind::Exception(_) => {
                text_response(StatusCode::OK, "application/xml", self.exception_report())
            }
        }
    }
}
