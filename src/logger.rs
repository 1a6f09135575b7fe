// SPDX-License-Identifier: MIT
//! Logging facade that stamps trace correlation ids on every record.
//!
//! [`Logger::init`] installs the process-wide `tracing` subscriber (env filter, JSON or
//! compact formatter, OpenTelemetry span bridge) and hands back a cloneable [`Logger`].
//! Each leveled call looks at the supplied OpenTelemetry [`Context`]; when it carries a
//! valid trace id, `trace_id` and `span_id` are recorded as fields of the event. Caller
//! fields are rendered together into a single `fields` value.
use std::fmt;
use std::io::Write;

use opentelemetry::trace::{TraceContextExt, TraceId, TracerProvider as _};
use opentelemetry::Context;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing::{Dispatch, Subscriber};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::{LogFormat, ServiceConfig};
use crate::error::LoggerError;

/// Target used for every record emitted through the facade.
pub const LOG_TARGET: &str = "service";

/// One structured key/value pair attached to a log record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub value: String,
}

impl Field {
    pub fn new(key: &'static str, value: impl fmt::Display) -> Self {
        Self {
            key,
            value: value.to_string(),
        }
    }
}

/// Renders as `key=value` pairs separated by spaces.
struct Fields<'a>(&'a [Field]);

impl fmt::Display for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", field.key, field.value)?;
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Lowercase hex trace and span id of `cx`, if it carries a valid trace id.
fn trace_ids(cx: &Context) -> Option<(String, String)> {
    let span = cx.span();
    let span_context = span.span_context();
    if span_context.trace_id() == TraceId::INVALID {
        return None;
    }
    Some((
        span_context.trace_id().to_string(),
        span_context.span_id().to_string(),
    ))
}

/// Append `trace_id` and `span_id` when `cx` carries a valid trace id.
pub fn inject_trace(cx: &Context, mut fields: Vec<Field>) -> Vec<Field> {
    if let Some((trace_id, span_id)) = trace_ids(cx) {
        fields.push(Field::new("trace_id", trace_id));
        fields.push(Field::new("span_id", span_id));
    }
    fields
}

/// Handle to the log subscriber. Cheap to clone.
#[derive(Clone)]
pub struct Logger {
    dispatch: Dispatch,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

impl Logger {
    /// Install the process-wide subscriber; spans are exported through `tracer_provider`.
    ///
    /// The level filter comes from `RUST_LOG` and defaults to `info`.
    ///
    /// # Errors
    /// Fails if a global subscriber is already installed.
    pub fn init(
        config: &ServiceConfig,
        tracer_provider: &SdkTracerProvider,
    ) -> Result<Self, LoggerError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let tracer = tracer_provider.tracer(config.service_name.clone());
        let subscriber = Registry::default()
            .with(filter)
            .with(fmt_layer(config.log_format, std::io::stdout))
            .with(OpenTelemetryLayer::new(tracer));

        let dispatch = Dispatch::new(subscriber);
        tracing::dispatcher::set_global_default(dispatch.clone())?;
        Ok(Self { dispatch })
    }

    /// Wrap an already built subscriber without installing it globally.
    pub fn from_dispatch(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    pub fn debug(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Severity::Debug, cx, msg, fields);
    }

    pub fn info(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Severity::Info, cx, msg, fields);
    }

    pub fn warn(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Severity::Warn, cx, msg, fields);
    }

    pub fn error(&self, cx: &Context, msg: &str, fields: &[Field]) {
        self.emit(Severity::Error, cx, msg, fields);
    }

    /// Flush buffered output. Call once before exit.
    pub fn sync(&self) {
        let _ = std::io::stdout().flush();
    }

    fn emit(&self, severity: Severity, cx: &Context, msg: &str, fields: &[Field]) {
        let (trace_id, span_id) = trace_ids(cx).unzip();
        let (trace_id, span_id) = (trace_id.as_deref(), span_id.as_deref());
        let fields = (!fields.is_empty()).then(|| Fields(fields).to_string());
        let fields = fields.as_deref();

        // `None` values are left out of the record.
        tracing::dispatcher::with_default(&self.dispatch, || match severity {
            Severity::Debug => {
                tracing::debug!(target: LOG_TARGET, fields, trace_id, span_id, "{msg}")
            }
            Severity::Info => {
                tracing::info!(target: LOG_TARGET, fields, trace_id, span_id, "{msg}")
            }
            Severity::Warn => {
                tracing::warn!(target: LOG_TARGET, fields, trace_id, span_id, "{msg}")
            }
            Severity::Error => {
                tracing::error!(target: LOG_TARGET, fields, trace_id, span_id, "{msg}")
            }
        });
    }
}

/// Formatting layer for `format`, writing to `writer`.
pub(crate) fn fmt_layer<S, W>(format: LogFormat, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(writer)
            .boxed(),
        // Console formatting: plain compact single-line output.
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed(),
    }
}
