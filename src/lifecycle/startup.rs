//! Startup wiring.
//!
//! # Responsibilities
//! - Turn a validated `GatewayConfig` into a ready `Dispatcher`
//! - Read capabilities documents once, before the listener opens
//!
//! # Design Decisions
//! - A configured but unreadable capabilities file aborts startup
//! - Services without a capabilities document are not served at all

use std::path::PathBuf;

use crate::config::GatewayConfig;
use crate::dispatch::{bearer_token, static_document, DispatchOptions, Dispatcher, EndpointTable};
use crate::protocol::{Operation, Service, WfsOperation, WmsOperation, WmtsOperation};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to read {service} capabilities from {}: {source}", path.display())]
    Capabilities {
        service: Service,
        path: PathBuf,
        source: std::io::Error,
    },
}

fn capabilities_operation(service: Service) -> Operation {
    match service {
        Service::Wfs => Operation::Wfs(WfsOperation::GetCapabilities),
        Service::Wms => Operation::Wms(WmsOperation::GetCapabilities),
        Service::Wmts => Operation::Wmts(WmtsOperation::GetCapabilities),
    }
}

/// Build the dispatcher the binary serves.
pub fn build_dispatcher(config: &GatewayConfig) -> Result<Dispatcher, StartupError> {
    let mut builder = Dispatcher::builder(DispatchOptions::from(config));

    for service in Service::ALL {
        let Some(path) = &config.services.get(service).capabilities else {
            continue;
        };
        let document = std::fs::read(path).map_err(|source| StartupError::Capabilities {
            service,
            path: path.clone(),
            source,
        })?;
        tracing::info!(service = %service, path = %path.display(), bytes = document.len(), "Capabilities loaded");
        builder = builder.operation(capabilities_operation(service), static_document(document, "text/xml"));
    }

    if let Some(api_key) = &config.auth.api_key {
        builder = builder.authorizer(bearer_token(api_key.clone()));
    }

    if let Some(endpoints) = &config.endpoints {
        builder = builder.endpoints(EndpointTable::from_flags(endpoints));
    }

    Ok(builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_registers_configured_capabilities() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<WMS_Capabilities/>").unwrap();

        let mut config = GatewayConfig::default();
        config.services.wms.capabilities = Some(file.path().to_path_buf());

        let dispatcher = build_dispatcher(&config).unwrap();
        assert!(dispatcher.operations().serves(Service::Wms));
        assert!(!dispatcher.operations().serves(Service::Wfs));
    }

    #[test]
    fn test_missing_capabilities_file() {
        let mut config = GatewayConfig::default();
        config.services.wfs.capabilities = Some(PathBuf::from("/nonexistent/wfs.xml"));

        let err = build_dispatcher(&config).unwrap_err();
        assert!(err.to_string().starts_with("failed to read wfs capabilities"));
    }
}
