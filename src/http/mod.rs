// SPDX-License-Identifier: MIT
//! HTTP surface: routes and middleware stack.
//!
//! | route | response |
//! |---|---|
//! | `GET /` | `200 text/plain` `Hello, World!` |
//! | `GET /metrics` | Prometheus text exposition |
//! | `GET /docs` | `301` to `/docs/index.html` |
//! | `GET /docs/index.html`, `GET /docs/openapi.json` | documentation UI and its OpenAPI document |
//!
//! Anything else is a `404`.
use std::sync::Arc;

use axum::routing::get;
use axum::{middleware as axum_middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::logger::Logger;

pub mod middleware;
pub mod routes;

use middleware::{AccessLog, RequestSpan};

/// Everything handlers need, built once at start-up and cloned per request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub logger: Logger,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(config: ServiceConfig, logger: Logger, metrics: PrometheusHandle) -> Self {
        Self {
            config: Arc::new(config),
            logger,
            metrics,
        }
    }
}

/// Build the application router.
///
/// Middleware, outermost first: request id, client IP, tracing span + access log,
/// request id propagation, request metrics, panic recovery.
pub fn router(state: AppState) -> Router {
    let layers = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(axum_middleware::from_fn(middleware::real_ip))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(RequestSpan::new(state.config.service_name.clone()))
                .on_response(AccessLog),
        )
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(axum_middleware::from_fn(middleware::track_metrics))
        .layer(CatchPanicLayer::new());

    Router::new()
        .merge(routes::root_routes())
        .route("/metrics", get(routes::metrics))
        .merge(routes::docs_routes())
        .layer(layers)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusRecorder};
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_sdk::propagation::TraceContextPropagator;
    use opentelemetry_sdk::trace::SdkTracerProvider;
    use opentelemetry_sdk::Resource;
    use tower::ServiceExt;
    use tracing_opentelemetry::OpenTelemetryLayer;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    use crate::config::LogFormat;
    use crate::logger::testing::capturing_logger;

    const TRACE_ID: &str = "4bf92f3577b34da6a3ce929d0e0e4736";
    const PARENT_SPAN_ID: &str = "00f067aa0ba902b7";

    fn primed_recorder() -> PrometheusRecorder {
        let recorder = PrometheusBuilder::new().build_recorder();
        let resource = Resource::builder_empty()
            .with_service_name("test-service")
            .build();
        crate::metrics::prime(&recorder, &resource);
        recorder
    }

    fn state_with(metrics: PrometheusHandle, logger: Logger) -> AppState {
        let config = ServiceConfig {
            service_name: "test-service".into(),
            ..ServiceConfig::default()
        };
        AppState::new(config, logger, metrics)
    }

    fn state() -> AppState {
        let logger = Logger::from_dispatch(tracing::Dispatch::none());
        state_with(primed_recorder().handle(), logger)
    }

    fn request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn get(uri: &str) -> axum::response::Response {
        router(state()).oneshot(request(uri)).await.unwrap()
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn root_returns_hello_world() {
        let response = get("/").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_string(response).await, "Hello, World!");
    }

    #[tokio::test]
    async fn unknown_path_is_not_found() {
        let response = get("/not-found").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_prometheus_text() {
        let response = get("/metrics").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("# HELP"), "{body}");
    }

    #[tokio::test]
    async fn docs_redirects_to_index() {
        let response = get("/docs").await;

        assert_eq!(response.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(response.headers()[header::LOCATION], "/docs/index.html");
    }

    #[tokio::test]
    async fn docs_index_and_openapi_are_served() {
        let index = get("/docs/index.html").await;
        assert_eq!(index.status(), StatusCode::OK);
        let html = body_string(index).await;
        assert!(html.contains(r##"dom_id: "#swagger-ui""##), "{html}");
        assert!(html.trim_end().ends_with("</html>"), "{html}");

        let openapi = get("/docs/openapi.json").await;
        assert_eq!(openapi.status(), StatusCode::OK);
        let body = body_string(openapi).await;
        let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(doc["info"]["title"], "test-service");
        assert!(doc["paths"].get("/").is_some());
    }

    #[tokio::test]
    async fn unknown_docs_asset_is_not_found() {
        let response = get("/docs/missing.css").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn request_id_is_generated_and_echoed() {
        let generated = get("/").await;
        assert!(generated.headers().contains_key("x-request-id"));

        let response = router(state())
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()["x-request-id"], "req-42");
    }

    #[test]
    fn requests_are_counted_by_method_route_and_status() {
        let recorder = primed_recorder();
        let handle = recorder.handle();
        let logger = Logger::from_dispatch(tracing::Dispatch::none());
        let app = router(state_with(handle.clone(), logger));

        // Middleware records through the thread's recorder; keep the request on this thread.
        let (ok, missing) = ::metrics::with_local_recorder(&recorder, || {
            tokio_test::block_on(async {
                let ok = app.clone().oneshot(request("/")).await.unwrap();
                let missing = app.oneshot(request("/nope")).await.unwrap();
                (ok, missing)
            })
        });
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let body = handle.render();
        assert!(
            body.contains(r#"http_requests_total{method="GET",route="/",status="200"} 1"#),
            "{body}"
        );
        assert!(body.contains(r#"route="unmatched",status="404""#), "{body}");
        assert!(body.contains(crate::metrics::HTTP_REQUEST_DURATION), "{body}");
    }

    #[test]
    fn incoming_traceparent_parents_request_span() {
        opentelemetry::global::set_text_map_propagator(TraceContextPropagator::new());
        let provider = SdkTracerProvider::builder().build();
        let tracer = provider.tracer("router-test");
        let subscriber = Registry::default().with(OpenTelemetryLayer::new(tracer));
        let (logger, buffer) = capturing_logger(LogFormat::Json);
        let app = router(state_with(primed_recorder().handle(), logger));
        let incoming = Request::builder()
            .uri("/")
            .header("traceparent", format!("00-{TRACE_ID}-{PARENT_SPAN_ID}-01"))
            .body(Body::empty())
            .unwrap();

        let response = tracing::subscriber::with_default(subscriber, || {
            tokio_test::block_on(app.oneshot(incoming))
        })
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The handler logs with the context of the span it runs in.
        let output = buffer.contents();
        let record: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(record["fields"]["trace_id"], TRACE_ID, "{output}");
        assert_ne!(record["fields"]["span_id"], PARENT_SPAN_ID, "{output}");
    }
}
