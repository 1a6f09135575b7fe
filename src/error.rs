// SPDX-License-Identifier: MIT
//! Error types for telemetry start-up, telemetry shutdown and logger installation.
use std::fmt;

/// Boxed cause returned by the pluggable factories and provider teardowns.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Start-up failure; the stage that failed is part of the message.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to create resource: {0}")]
    Resource(#[source] BoxError),
    #[error("failed to initialize OTLP trace exporter: {0}")]
    TraceExporter(#[source] BoxError),
    #[error("failed to initialize Prometheus metric exporter: {0}")]
    MetricExporter(#[source] BoxError),
}

/// A single provider that failed to shut down.
#[derive(Debug, thiserror::Error)]
pub enum ShutdownFailure {
    #[error("tracer shutdown error: {0}")]
    Tracer(#[source] BoxError),
    #[error("meter shutdown error: {0}")]
    Meter(#[source] BoxError),
}

/// Every teardown failure observed during one shutdown, in the order they happened.
///
/// Renders as the individual messages joined by `"; "`, e.g.
/// `tracer shutdown error: ...; meter shutdown error: ...`.
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<ShutdownFailure>,
}

impl ShutdownError {
    /// `Ok(())` when nothing failed.
    pub(crate) fn from_failures(failures: Vec<ShutdownFailure>) -> Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }

    pub fn failures(&self) -> &[ShutdownFailure] {
        &self.failures
    }

    pub fn tracer_failed(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f, ShutdownFailure::Tracer(_)))
    }

    pub fn meter_failed(&self) -> bool {
        self.failures
            .iter()
            .any(|f| matches!(f, ShutdownFailure::Meter(_)))
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Failure to install the process-wide log subscriber.
#[derive(Debug, thiserror::Error)]
pub enum LoggerError {
    #[error("cannot initialize logger: {0}")]
    SetGlobalDefault(#[from] tracing::dispatcher::SetGlobalDefaultError),
}
