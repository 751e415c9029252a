//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::response::{IntoResponse, Response};
use tokio::net::TcpListener;

use ows_gateway::config::GatewayConfig;
use ows_gateway::dispatch::{
    authorizer_fn, handler_fn, AuthToken, Authorization, DispatchOptions, Dispatcher, DispatcherBuilder,
    OperationHandler,
};
use ows_gateway::http::HttpServer;
use ows_gateway::lifecycle::Shutdown;
use ows_gateway::protocol::{Operation, Service};

/// Header echoing how the request passed the authorization gate.
pub const AUTH_HEADER: &str = "x-test-authorization";

/// Handler answering with `<service>:<operation>` and the authorization outcome.
pub fn echo(operation: Operation) -> OperationHandler {
    handler_fn(move |state| async move {
        let auth = match &state.authorization {
            Authorization::Pending => "pending",
            Authorization::Anonymous => "anonymous",
            Authorization::Granted(_) => "granted",
        };
        let mut response: Response = operation.to_string().into_response();
        response
            .headers_mut()
            .insert(AUTH_HEADER, auth.parse().expect("static header value"));
        Ok(response)
    })
}

/// Builder with an echo handler for every operation of every service.
pub fn echo_builder(options: DispatchOptions) -> DispatcherBuilder {
    Service::ALL
        .into_iter()
        .flat_map(|service| Operation::all(service).iter().copied())
        .fold(Dispatcher::builder(options), |builder, op| builder.operation(op, echo(op)))
}

/// Authorizer granting requests that carry `x-api-key: let-me-in`, counting every call.
pub fn counting_authorizer(calls: Arc<AtomicUsize>) -> ows_gateway::dispatch::Authorizer {
    authorizer_fn(move |state| {
        calls.fetch_add(1, Ordering::SeqCst);
        let granted = state
            .headers
            .get("x-api-key")
            .is_some_and(|value| value == "let-me-in");
        async move { granted.then(|| AuthToken::new("tester")) }
    })
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Serve `dispatcher` on an ephemeral local port.
pub async fn start_server(config: GatewayConfig, dispatcher: Dispatcher) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let server = HttpServer::new(config, dispatcher);
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    wait_for_port(addr).await;
    (addr, shutdown)
}

async fn wait_for_port(addr: SocketAddr) {
    for _ in 0..50 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("server at {} did not start", addr);
}
