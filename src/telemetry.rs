// SPDX-License-Identifier: MIT
//! Telemetry initialization and shutdown (OTLP traces, Prometheus metrics).
//!
//! The public API is intentionally small:
//!
//! * [`TelemetryBuilder`] – wires one factory per external dependency (resource, trace
//!   exporter, metric exporter) and runs the start-up sequence.
//! * [`Telemetry`] – the initialized providers plus the shutdown guard.
//! * [`TelemetryGuard`] – the single shutdown operation, bounded by [`SHUTDOWN_TIMEOUT`].
//!
//! # Example
//! ```no_run
//! use otel_service_template::config::ServiceConfig;
//! use otel_service_template::telemetry::TelemetryBuilder;
//! fn main() -> anyhow::Result<()> {
//!     let telemetry = TelemetryBuilder::new().init(&ServiceConfig::load())?;
//!     // ... application logic ...
//!     telemetry.shutdown()?; // ensure final spans exported
//!     Ok(())
//! }
//! ```
//!
//! # Start-up
//! Each stage short-circuits with a [`TelemetryError`] naming the stage. Nothing from a
//! later stage is registered globally once an earlier one fails.
//!
//! # Shutdown
//! Both providers always get a teardown attempt; failures are collected into a
//! [`ShutdownError`]. The deadline covers the whole sequence, not each provider.
//!
//! # Threading Model
//! The batch span processor runs its own worker thread and the OTLP exporter uses the
//! blocking HTTP client, so shutdown blocks the calling thread.
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::{
    Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::{SdkTracerProvider, SpanExporter};
use opentelemetry_sdk::Resource;
use tracing::{debug, warn};

use crate::config::ServiceConfig;
use crate::error::{BoxError, ShutdownError, ShutdownFailure, TelemetryError};
use crate::metrics::{self as service_metrics, HTTP_DURATION_BUCKETS, HTTP_REQUEST_DURATION};

/// Upper bound on the whole shutdown sequence.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Builds the resource shared by every provider.
pub trait ResourceFactory {
    fn build(&self, config: &ServiceConfig) -> Result<Resource, BoxError>;
}

/// Builds the span exporter behind the batch processor.
pub trait TraceExporterFactory {
    type Exporter: SpanExporter + 'static;

    fn build(&self, config: &ServiceConfig) -> Result<Self::Exporter, BoxError>;
}

/// Builds the pull-based metrics recorder.
pub trait MetricExporterFactory {
    fn build(&self, config: &ServiceConfig) -> Result<PrometheusRecorder, BoxError>;
}

/// A provider that can be torn down within a time limit.
pub trait ProviderShutdown: Send {
    fn shutdown_within(&self, timeout: Duration) -> Result<(), BoxError>;
}

impl ProviderShutdown for SdkTracerProvider {
    fn shutdown_within(&self, timeout: Duration) -> Result<(), BoxError> {
        self.shutdown_with_timeout(timeout).map_err(Into::into)
    }
}

/// `service.name`, `service.version` and `deployment.environment`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceResource;

impl ResourceFactory for ServiceResource {
    fn build(&self, config: &ServiceConfig) -> Result<Resource, BoxError> {
        if config.service_name.trim().is_empty() {
            return Err("service name must not be empty".into());
        }
        Ok(Resource::builder()
            .with_service_name(config.service_name.clone())
            .with_attributes([
                KeyValue::new("service.version", config.service_version.clone()),
                KeyValue::new("deployment.environment", config.environment.clone()),
            ])
            .build())
    }
}

/// OTLP over HTTP/protobuf, posting to `{otlp_endpoint}/v1/traces`.
///
/// Only the `otlp` exporter kind is available; any other `OTEL_EXPORTER` value is
/// rejected so a misconfiguration fails start-up instead of silently exporting nowhere.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtlpTraceExporter;

impl TraceExporterFactory for OtlpTraceExporter {
    type Exporter = opentelemetry_otlp::SpanExporter;

    fn build(&self, config: &ServiceConfig) -> Result<Self::Exporter, BoxError> {
        if !config.exporter.eq_ignore_ascii_case("otlp") {
            return Err(format!(
                "unsupported exporter `{}`, only `otlp` is available",
                config.exporter
            )
            .into());
        }
        let base = config.otlp_endpoint.trim_end_matches('/');
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(format!("{}/v1/traces", base))
            .build()?;
        Ok(exporter)
    }
}

/// Prometheus text exposition, rendered on demand by the `/metrics` route.
#[derive(Clone, Copy, Debug, Default)]
pub struct PrometheusMetricExporter;

impl MetricExporterFactory for PrometheusMetricExporter {
    fn build(&self, _config: &ServiceConfig) -> Result<PrometheusRecorder, BoxError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(HTTP_REQUEST_DURATION.to_string()),
                HTTP_DURATION_BUCKETS,
            )?
            .build_recorder();
        Ok(recorder)
    }
}

/// Metrics side of the telemetry pair. Holds the render handle of the installed recorder.
#[derive(Clone)]
pub struct PrometheusMeterProvider {
    handle: PrometheusHandle,
}

impl PrometheusMeterProvider {
    /// Bind a recorder to `resource` and install it as the process-wide recorder.
    ///
    /// A recorder can only be installed once per process; later calls keep a working
    /// handle on their own registry and log a warning.
    pub fn install(recorder: PrometheusRecorder, resource: &Resource) -> Self {
        let handle = recorder.handle();
        service_metrics::prime(&recorder, resource);
        if let Err(e) = metrics::set_global_recorder(recorder) {
            warn!(target: "otel_lifecycle", error = %e, "metrics recorder already installed");
        }
        Self { handle }
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }
}

impl ProviderShutdown for PrometheusMeterProvider {
    fn shutdown_within(&self, _timeout: Duration) -> Result<(), BoxError> {
        // Scrape-based: nothing to push, only drain histogram buffers.
        self.handle.run_upkeep();
        Ok(())
    }
}

/// The shutdown operation: owns both teardown capabilities and is consumed by use.
pub struct TelemetryGuard {
    tracer: Box<dyn ProviderShutdown>,
    meter: Box<dyn ProviderShutdown>,
}

impl TelemetryGuard {
    pub fn new(
        tracer: impl ProviderShutdown + 'static,
        meter: impl ProviderShutdown + 'static,
    ) -> Self {
        Self {
            tracer: Box::new(tracer),
            meter: Box::new(meter),
        }
    }

    /// Shut both providers down within [`SHUTDOWN_TIMEOUT`].
    pub fn shutdown(self) -> Result<(), ShutdownError> {
        self.shutdown_within(SHUTDOWN_TIMEOUT)
    }

    /// Shut both providers down within `budget`, capped at [`SHUTDOWN_TIMEOUT`].
    ///
    /// The meter is torn down even when the tracer fails, with whatever time is left.
    pub fn shutdown_within(self, budget: Duration) -> Result<(), ShutdownError> {
        let deadline = Instant::now() + budget.min(SHUTDOWN_TIMEOUT);
        let mut failures = Vec::new();

        if let Err(e) = self.tracer.shutdown_within(remaining(deadline)) {
            failures.push(ShutdownFailure::Tracer(e));
        }
        if let Err(e) = self.meter.shutdown_within(remaining(deadline)) {
            failures.push(ShutdownFailure::Meter(e));
        }

        debug!(target: "otel_lifecycle", failures = failures.len(), "telemetry shut down");
        ShutdownError::from_failures(failures)
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}

/// Initialized telemetry. Call [`Telemetry::shutdown`] before exiting to flush spans.
pub struct Telemetry {
    tracer_provider: SdkTracerProvider,
    metrics: PrometheusHandle,
    guard: TelemetryGuard,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("tracer_provider", &self.tracer_provider)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// Render handle for the `/metrics` route.
    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics.clone()
    }

    pub fn shutdown(self) -> Result<(), ShutdownError> {
        self.guard.shutdown()
    }

    pub fn shutdown_within(self, budget: Duration) -> Result<(), ShutdownError> {
        self.guard.shutdown_within(budget)
    }
}

/// Runs the start-up sequence with pluggable factories.
///
/// Defaults: [`ServiceResource`], [`OtlpTraceExporter`], [`PrometheusMetricExporter`].
pub struct TelemetryBuilder<
    R = ServiceResource,
    T = OtlpTraceExporter,
    M = PrometheusMetricExporter,
> {
    resources: R,
    traces: T,
    metrics: M,
}

impl TelemetryBuilder {
    pub fn new() -> Self {
        Self {
            resources: ServiceResource,
            traces: OtlpTraceExporter,
            metrics: PrometheusMetricExporter,
        }
    }
}

impl Default for TelemetryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, T, M> TelemetryBuilder<R, T, M>
where
    R: ResourceFactory,
    T: TraceExporterFactory,
    M: MetricExporterFactory,
{
    pub fn with_resource_factory<R2: ResourceFactory>(
        self,
        resources: R2,
    ) -> TelemetryBuilder<R2, T, M> {
        TelemetryBuilder {
            resources,
            traces: self.traces,
            metrics: self.metrics,
        }
    }

    pub fn with_trace_exporter_factory<T2: TraceExporterFactory>(
        self,
        traces: T2,
    ) -> TelemetryBuilder<R, T2, M> {
        TelemetryBuilder {
            resources: self.resources,
            traces,
            metrics: self.metrics,
        }
    }

    pub fn with_metric_exporter_factory<M2: MetricExporterFactory>(
        self,
        metrics: M2,
    ) -> TelemetryBuilder<R, T, M2> {
        TelemetryBuilder {
            resources: self.resources,
            traces: self.traces,
            metrics,
        }
    }

    /// Build providers, register them process-wide and return the shutdown handle.
    ///
    /// Installs the global tracer provider, the W3C trace-context propagator and the
    /// global `metrics` recorder.
    ///
    /// # Errors
    /// [`TelemetryError::Resource`], [`TelemetryError::TraceExporter`] or
    /// [`TelemetryError::MetricExporter`], wrapping the factory's cause.
    pub fn init(self, config: &ServiceConfig) -> Result<Telemetry, TelemetryError> {
        let resource = self
            .resources
            .build(config)
            .map_err(TelemetryError::Resource)?;

        let span_exporter = self
            .traces
            .build(config)
            .map_err(TelemetryError::TraceExporter)?;

        let tracer_provider = SdkTracerProvider::builder()
            .with_batch_exporter(span_exporter)
            .with_resource(resource.clone())
            .build();
        global::set_tracer_provider(tracer_provider.clone());
        global::set_text_map_propagator(TraceContextPropagator::new());
        debug!(target: "otel_lifecycle", service = %config.service_name, "tracer provider registered");

        let recorder = self
            .metrics
            .build(config)
            .map_err(TelemetryError::MetricExporter)?;
        let meter_provider = PrometheusMeterProvider::install(recorder, &resource);
        debug!(target: "otel_lifecycle", "metrics recorder registered");

        Ok(Telemetry {
            metrics: meter_provider.handle(),
            guard: TelemetryGuard::new(tracer_provider.clone(), meter_provider),
            tracer_provider,
        })
    }
}
