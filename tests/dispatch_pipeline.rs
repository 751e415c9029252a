//! Dispatch pipeline behaviour driven through the full router.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::IntoResponse;
use futures_util::future::BoxFuture;
use tower::ServiceExt;

use ows_gateway::config::GatewayConfig;
use ows_gateway::dispatch::{
    endpoint_fn, handler_fn, DispatchOptions, DispatcherBuilder, EndpointTable, OwsError,
};
use ows_gateway::http::{BodyStream, HttpServer};
use ows_gateway::protocol::{GetFeatureParams, Operation, WfsOperation};
use ows_gateway::xml::{Document, DocumentParser, Filter, XmlDocumentParser, XmlError};

mod common;
use common::{body_text, counting_authorizer, echo_builder, AUTH_HEADER};

/// Parser that counts body parses before delegating to the default one.
struct CountingParser {
    bodies: Arc<AtomicUsize>,
}

impl DocumentParser for CountingParser {
    fn parse_body(&self, body: BodyStream, limit: usize) -> BoxFuture<'static, Result<Option<Document>, XmlError>> {
        self.bodies.fetch_add(1, Ordering::SeqCst);
        XmlDocumentParser.parse_body(body, limit)
    }

    fn parse_filter(&self, expression: &str) -> Result<Filter, XmlError> {
        XmlDocumentParser.parse_filter(expression)
    }
}

struct Harness {
    auth_calls: Arc<AtomicUsize>,
    bodies: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        Self {
            auth_calls: Arc::new(AtomicUsize::new(0)),
            bodies: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn builder(&self) -> DispatcherBuilder {
        echo_builder(DispatchOptions::default())
            .authorizer(counting_authorizer(self.auth_calls.clone()))
            .parser(Arc::new(CountingParser {
                bodies: self.bodies.clone(),
            }))
    }

    async fn send(&self, builder: DispatcherBuilder, request: Request<Body>) -> axum::response::Response {
        HttpServer::new(GatewayConfig::default(), builder.build())
            .router()
            .oneshot(request)
            .await
            .unwrap()
    }

    fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    fn bodies(&self) -> usize {
        self.bodies.load(Ordering::SeqCst)
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("x-api-key", "let-me-in")
        .body(body.into())
        .unwrap()
}

#[tokio::test]
async fn test_capabilities_skip_authorization() {
    let harness = Harness::new();
    let response = harness
        .send(harness.builder(), get("/ows/wms?SERVICE=WMS&REQUEST=GetCapabilities"))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[AUTH_HEADER], "pending");
    assert_eq!(body_text(response).await, "wms:getcapabilities");
    assert_eq!(harness.auth_calls(), 0);
}

#[tokio::test]
async fn test_post_capabilities_skip_body() {
    let harness = Harness::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/wfs?request=GetCapabilities")
        .header(header::CONTENT_ENCODING, "br")
        .body(Body::from("not xml at all"))
        .unwrap();
    let response = harness.send(harness.builder(), request).await;

    assert_eq!(body_text(response).await, "wfs:getcapabilities");
    assert_eq!(harness.bodies(), 0);
}

#[tokio::test]
async fn test_get_without_request_is_missing_parameter() {
    let harness = Harness::new();
    let response = harness.send(harness.builder(), get("/wfs?typename=roads")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("exceptionCode=\"MissingParameterValue\""));
    assert!(body.contains("locator=\"request\""));
    assert_eq!(harness.auth_calls(), 0);
}

#[tokio::test]
async fn test_unknown_service_fails_before_authorization() {
    let harness = Harness::new();
    let response = harness
        .send(harness.builder(), post("/ows?service=WCS", "<GetCoverage/>"))
        .await;

    let body = body_text(response).await;
    assert!(body.contains("exceptionCode=\"InvalidParameterValue\""));
    assert!(body.contains("locator=\"service\""));
    assert_eq!(harness.auth_calls(), 0);
    assert_eq!(harness.bodies(), 0);
}

#[tokio::test]
async fn test_post_infers_operation_from_root() {
    let harness = Harness::new();
    let response = harness
        .send(
            harness.builder(),
            post("/geo/wfs", r#"<wfs:GetFeature xmlns:wfs="http://www.opengis.net/wfs"><wfs:Query typeName="roads"/></wfs:GetFeature>"#),
        )
        .await;

    assert_eq!(response.headers()[AUTH_HEADER], "granted");
    assert_eq!(body_text(response).await, "wfs:getfeature");
    assert_eq!(harness.auth_calls(), 1);
    assert_eq!(harness.bodies(), 1);
}

#[tokio::test]
async fn test_post_unknown_root_is_invalid_request() {
    let harness = Harness::new();
    let response = harness.send(harness.builder(), post("/wms", "<GetLegendGraphic/>")).await;

    let body = body_text(response).await;
    assert!(body.contains("locator=\"request\""));
    assert!(body.contains("Invalid parameter request: getlegendgraphic"));
}

#[tokio::test]
async fn test_unauthorized_post_never_reads_body() {
    let harness = Harness::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/wfs")
        .body(Body::from("<GetFeature/>"))
        .unwrap();
    let response = harness.send(harness.builder(), request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Basic realm=\"ows-gateway\"");
    assert_eq!(body_text(response).await, "401 Unauthorized");
    assert_eq!(harness.auth_calls(), 1);
    assert_eq!(harness.bodies(), 0);
}

#[tokio::test]
async fn test_unauthorized_get_is_rejected() {
    let harness = Harness::new();
    let response = harness.send(harness.builder(), get("/wmts?request=GetTile&layer=a")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unsupported_encoding_is_415() {
    let harness = Harness::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/wfs")
        .header("x-api-key", "let-me-in")
        .header(header::CONTENT_ENCODING, "br")
        .body(Body::from("<GetFeature/>"))
        .unwrap();
    let response = harness.send(harness.builder(), request).await;

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body_text(response).await, "415 Unsupported Media Type");
    assert_eq!(harness.bodies(), 0);
}

#[tokio::test]
async fn test_gzip_body_is_decoded() {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"<GetMap><StyledLayerDescriptor/></GetMap>").unwrap();
    let compressed = encoder.finish().unwrap();

    let harness = Harness::new();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/wms")
        .header("x-api-key", "let-me-in")
        .header(header::CONTENT_ENCODING, "gzip")
        .body(Body::from(compressed))
        .unwrap();
    let response = harness.send(harness.builder(), request).await;

    assert_eq!(body_text(response).await, "wms:getmap");
}

#[tokio::test]
async fn test_request_param_beats_body_root() {
    let harness = Harness::new();
    let response = harness
        .send(harness.builder(), post("/wfs?request=DescribeFeatureType", "<GetFeature/>"))
        .await;
    assert_eq!(body_text(response).await, "wfs:describefeaturetype");
}

#[tokio::test]
async fn test_endpoint_table() {
    let harness = Harness::new();
    let endpoints = EndpointTable::new()
        .allow("wfs")
        .custom("status", endpoint_fn(|request| async move {
            format!("custom {}", request.uri().path()).into_response()
        }));

    let response = harness
        .send(harness.builder().endpoints(endpoints.clone()), get("/any/status?request=GetMap"))
        .await;
    assert_eq!(body_text(response).await, "custom /any/status");

    let response = harness
        .send(harness.builder().endpoints(endpoints.clone()), get("/wms?request=GetCapabilities"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // The table keys on the endpoint; the service parameter still picks the protocol.
    let response = harness
        .send(
            harness.builder().endpoints(endpoints),
            get("/wfs?service=wms&request=GetCapabilities"),
        )
        .await;
    assert_eq!(body_text(response).await, "wms:getcapabilities");
    assert_eq!(harness.auth_calls(), 0);
}

#[tokio::test]
async fn test_handler_failures_become_reports() {
    let dispatcher = echo_builder(DispatchOptions::default())
        .operation(
            Operation::Wfs(WfsOperation::GetFeature),
            handler_fn(|state| async move {
                let params = GetFeatureParams::from_state(&state)?;
                Ok(format!("{} x {}", params.type_names.join("+"), params.max_features).into_response())
            }),
        )
        .operation(
            Operation::Wfs(WfsOperation::DescribeFeatureType),
            handler_fn(|state| async move {
                if state.method == Method::POST {
                    panic!("handler bug");
                }
                Err::<axum::response::Response, _>(OwsError::from_code(404, None, None))
            }),
        )
        .build();
    let router = HttpServer::new(GatewayConfig::default(), dispatcher).router();

    let ok = router.clone().oneshot(get("/wfs?request=GetFeature&typename=a,b&maxfeatures=7")).await.unwrap();
    assert_eq!(body_text(ok).await, "a+b x 7");

    let invalid = router
        .clone()
        .oneshot(get("/wfs?request=GetFeature&typename=a&maxfeatures=ten"))
        .await
        .unwrap();
    assert!(body_text(invalid).await.contains("locator=\"maxFeatures\""));

    let status = router
        .clone()
        .oneshot(get("/wfs?request=DescribeFeatureType&typename=a"))
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::NOT_FOUND);

    let panicked = router
        .oneshot(post("/wfs?request=DescribeFeatureType", ""))
        .await
        .unwrap();
    assert_eq!(panicked.status(), StatusCode::OK);
    let body = body_text(panicked).await;
    assert!(body.contains("exceptionCode=\"NoApplicableCode\""));
    assert!(body.contains("<ows:ExceptionText>Unknown error</ows:ExceptionText>"));
}

#[tokio::test]
async fn test_unsafe_values_are_sanitized_before_handlers() {
    let dispatcher = echo_builder(DispatchOptions::default())
        .operation(
            Operation::Wfs(WfsOperation::DescribeFeatureType),
            handler_fn(|state| async move {
                Ok(state.params.get("typename").unwrap_or("").to_string().into_response())
            }),
        )
        .build();
    let response = HttpServer::new(GatewayConfig::default(), dispatcher)
        .router()
        .oneshot(get("/wfs?request=DescribeFeatureType&typename=%3Cscript%3Ealert(1)%3C/script%3E"))
        .await
        .unwrap();
    assert_eq!(body_text(response).await, "?script?alert?1??/script?");
}
