// SPDX-License-Identifier: MIT
//! Crate providing a minimal HTTP service scaffold with OpenTelemetry wired in.
//!
//! This library focuses on a pragmatic combination of `tracing` + OpenTelemetry + Prometheus:
//! * Traces exported over OTLP/HTTP, with W3C trace-context propagation.
//! * Metrics pulled from `/metrics` in Prometheus text format.
//! * A logging facade stamping `trace_id`/`span_id` on records.
//!
//! The primary entry points are [`config::ServiceConfig`], [`telemetry::TelemetryBuilder`],
//! [`logger::Logger`] and [`http::router`].
//!
//! # Quick Start
//! ```no_run
//! use otel_service_template::config::ServiceConfig;
//! use otel_service_template::http::{router, AppState};
//! use otel_service_template::logger::Logger;
//! use otel_service_template::telemetry::TelemetryBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::load();
//!     let telemetry = TelemetryBuilder::new().init(&config)?;
//!     let logger = Logger::init(&config, telemetry.tracer_provider())?;
//!     let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
//!     let app = router(AppState::new(config, logger, telemetry.metrics_handle()));
//!     axum::serve(listener, app).await?;
//!     telemetry.shutdown()?;
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod error;
pub mod http;
pub mod logger;
pub mod metrics;
pub mod telemetry;
