// SPDX-License-Identifier: MIT
//! Metric names, descriptions and recording helpers.
//!
//! Series follow Prometheus naming conventions and are rendered on `/metrics`.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Label,
};
use metrics_exporter_prometheus::PrometheusRecorder;
use opentelemetry_sdk::Resource;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "http_request_duration_seconds";
/// Resource attributes, one label each, constant value `1`.
pub const TARGET_INFO: &str = "target_info";

/// Bucket boundaries (seconds) for [`HTTP_REQUEST_DURATION`].
pub const HTTP_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Register all metric descriptions against the current recorder.
pub fn register_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests served");
    describe_histogram!(
        HTTP_REQUEST_DURATION,
        metrics::Unit::Seconds,
        "Duration of HTTP request handling in seconds"
    );
    describe_gauge!(TARGET_INFO, "Target metadata");
}

/// Publish the resource attributes as the `target_info` series.
pub fn set_target_info(resource: &Resource) {
    let labels: Vec<Label> = resource
        .iter()
        .map(|(key, value)| Label::new(key.as_str().replace('.', "_"), value.to_string()))
        .collect();
    gauge!(TARGET_INFO, labels).set(1.0);
}

/// Describe every series and publish `target_info` on a specific recorder,
/// whether or not it is (or will be) the global one.
pub fn prime(recorder: &PrometheusRecorder, resource: &Resource) {
    metrics::with_local_recorder(recorder, || {
        register_metrics();
        set_target_info(resource);
    });
}

/// Record one completed HTTP request.
pub fn record_request(method: &str, route: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!(HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(HTTP_REQUEST_DURATION, &labels).record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    fn resource() -> Resource {
        Resource::builder_empty()
            .with_service_name("metrics-test")
            .build()
    }

    #[test]
    fn primed_recorder_exposes_help_and_target_info() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        prime(&recorder, &resource());
        let body = handle.render();

        assert!(body.contains("# HELP target_info Target metadata"), "{body}");
        assert!(body.contains(r#"service_name="metrics-test""#), "{body}");
    }

    #[test]
    fn record_request_labels_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            register_metrics();
            record_request("GET", "/", 200, 0.002);
            record_request("GET", "/", 200, 0.003);
        });
        let body = handle.render();

        assert!(
            body.contains(r#"http_requests_total{method="GET",route="/",status="200"} 2"#),
            "{body}"
        );
    }
}
