//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router whose fallback hands every request to the dispatcher
//! - Wire up middleware (tracing, request ID, timeout, body limit)
//! - Bind server to listener and drain on shutdown

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::http::request::{propagate_request_id_layer, request_span, set_request_id_layer};
use crate::lifecycle::shutdown;

/// HTTP server for the OWS gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    pub fn new(config: GatewayConfig, dispatcher: Dispatcher) -> Self {
        let router = Self::build_router(&config, dispatcher);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, dispatcher: Dispatcher) -> Router {
        Router::new()
            .fallback(ows_handler)
            .with_state(dispatcher)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(request_span))
            .layer(set_request_id_layer())
    }

    /// The fully layered router, e.g. for driving it without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn ows_handler(State(dispatcher): State<Dispatcher>, request: Request<Body>) -> Response {
    dispatcher.dispatch(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{handler_fn, DispatchOptions};
    use crate::protocol::{Operation, WmsOperation};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use tower::ServiceExt;

    fn server(config: GatewayConfig) -> HttpServer {
        let dispatcher = Dispatcher::builder(DispatchOptions::from(&config))
            .operation(
                Operation::Wms(WmsOperation::GetCapabilities),
                handler_fn(|_state| async { Ok("caps".into_response()) }),
            )
            .build();
        HttpServer::new(config, dispatcher)
    }

    #[tokio::test]
    async fn test_any_path_reaches_dispatcher() {
        let response = server(GatewayConfig::default())
            .router()
            .oneshot(
                Request::builder()
                    .uri("/deep/path/wms?request=GetCapabilities")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_raw_body_limit() {
        let mut config = GatewayConfig::default();
        config.limits.max_body_size = 8;

        let response = server(config)
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/wms")
                    .header("content-length", "64")
                    .body(Body::from(vec![b' '; 64]))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
