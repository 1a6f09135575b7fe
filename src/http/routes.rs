// SPDX-License-Identifier: MIT
//! Route handlers.
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use super::AppState;

pub const HELLO_BODY: &str = "Hello, World!";
pub const DOCS_INDEX_PATH: &str = "/docs/index.html";

const DOCS_INDEX: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <title>API documentation</title>
  <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
  <div id="swagger-ui"></div>
  <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
  <script>
    window.onload = () => {
      window.ui = SwaggerUIBundle({ url: "/docs/openapi.json", dom_id: "#swagger-ui" });
    };
  </script>
</body>
</html>
"##;

/// `GET /`.
pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(hello_world))
}

/// `GET /docs` and `GET /docs/{*path}`.
pub fn docs_routes() -> Router<AppState> {
    Router::new()
        .route("/docs", get(docs_redirect))
        .route("/docs/{*path}", get(docs_asset))
}

pub async fn hello_world(State(state): State<AppState>) -> Response {
    let cx = tracing::Span::current().context();
    state.logger.debug(&cx, "serving hello world", &[]);
    ([(header::CONTENT_TYPE, "text/plain")], HELLO_BODY).into_response()
}

/// Prometheus text exposition of every registered series.
pub async fn metrics(State(state): State<AppState>) -> Response {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
        .into_response()
}

pub async fn docs_redirect() -> Response {
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, DOCS_INDEX_PATH)]).into_response()
}

pub async fn docs_asset(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    match path.as_str() {
        "index.html" => Html(DOCS_INDEX).into_response(),
        "openapi.json" => Json(openapi_document(&state)).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn openapi_document(state: &AppState) -> serde_json::Value {
    serde_json::json!({
        "openapi": "3.0.3",
        "info": {
            "title": state.config.service_name,
            "version": state.config.service_version,
            "description": "Service template with OpenTelemetry tracing and Prometheus metrics",
        },
        "paths": {
            "/": {
                "get": {
                    "tags": ["Root"],
                    "summary": "Hello World endpoint",
                    "responses": {
                        "200": {
                            "description": HELLO_BODY,
                            "content": { "text/plain": { "schema": { "type": "string" } } }
                        }
                    }
                }
            },
            "/metrics": {
                "get": {
                    "tags": ["Observability"],
                    "summary": "Prometheus metrics",
                    "responses": { "200": { "description": "Prometheus text exposition" } }
                }
            }
        }
    })
}
