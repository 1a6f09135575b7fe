// SPDX-License-Identifier: MIT
//! Request middleware: client IP extraction, per-request tracing span, request metrics.
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, MatchedPath, Request};
use axum::http::{HeaderMap, Response};
use axum::middleware::Next;
use opentelemetry::propagation::Extractor;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::metrics::record_request;

/// Best-effort address of the client that issued the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientIp(pub IpAddr);

/// Resolve the client address from `X-Forwarded-For`, then `X-Real-IP`, then the peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    let forwarded: Option<IpAddr> = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok());
    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    };
    forwarded.or_else(real_ip).or(peer.map(|addr| addr.ip()))
}

/// Stores a [`ClientIp`] extension for downstream layers and handlers.
pub async fn real_ip(mut request: Request, next: Next) -> axum::response::Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    if let Some(ip) = client_ip(request.headers(), peer) {
        request.extensions_mut().insert(ClientIp(ip));
    }
    next.run(request).await
}

/// Records `http_requests_total` and `http_request_duration_seconds`.
pub async fn track_metrics(request: Request, next: Next) -> axum::response::Response {
    let start = Instant::now();
    let method = request.method().clone();
    // Label by route template, not raw path, to keep cardinality bounded.
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let response = next.run(request).await;

    record_request(
        method.as_str(),
        &route,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );
    response
}

struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

/// Builds the per-request span, parented on an incoming `traceparent` if any.
#[derive(Clone, Debug)]
pub struct RequestSpan {
    service_name: String,
}

impl RequestSpan {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }
}

impl<B> tower_http::trace::MakeSpan<B> for RequestSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let request_id = request
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let client_ip = request
            .extensions()
            .get::<ClientIp>()
            .map(|ClientIp(ip)| ip.to_string())
            .unwrap_or_default();

        let span = tracing::info_span!(
            "http.request",
            service.name = %self.service_name,
            http.method = %request.method(),
            http.target = %request.uri(),
            request_id = %request_id,
            client_ip = %client_ip,
        );

        let parent = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&HeaderExtractor(request.headers()))
        });
        let _ = span.set_parent(parent);
        span
    }
}

/// Access log line emitted inside the request span when the response head is ready.
#[derive(Clone, Copy, Debug, Default)]
pub struct AccessLog;

impl<B> tower_http::trace::OnResponse<B> for AccessLog {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        tracing::info!(
            status = response.status().as_u16(),
            latency_ms = latency_millis(latency),
            "request completed"
        );
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn latency_millis(latency: Duration) -> u64 {
    u64::try_from(latency.as_millis()).unwrap_or(u64::MAX)
}
