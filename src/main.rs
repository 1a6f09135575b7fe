// SPDX-License-Identifier: MIT
use std::net::SocketAddr;

use anyhow::{Context as _, Result};
use opentelemetry::Context;
use otel_service_template::config::ServiceConfig;
use otel_service_template::http::{router, AppState};
use otel_service_template::logger::{Field, Logger};
use otel_service_template::telemetry::TelemetryBuilder;
use tokio::net::TcpListener;
use tokio::signal;

async fn shutdown_signal(logger: Logger) {
    let cx = Context::new();
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            let fields = [Field::new("error", e)];
            logger.error(&cx, "failed to install Ctrl+C handler", &fields);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                let fields = [Field::new("error", e)];
                logger.error(&cx, "failed to install SIGTERM handler", &fields);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => logger.info(&cx, "received Ctrl+C, shutting down", &[]),
        _ = terminate => logger.info(&cx, "received SIGTERM, shutting down", &[]),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::load();
    let telemetry = TelemetryBuilder::new()
        .init(&config)
        .context("failed to init telemetry")?;
    let logger = Logger::init(&config, telemetry.tracer_provider())?;
    let cx = Context::new();

    logger.info(
        &cx,
        "starting server",
        &[
            Field::new("listen_addr", &config.listen_addr),
            Field::new("service", &config.service_name),
            Field::new("exporter", &config.exporter),
        ],
    );

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let state = AppState::new(config, logger.clone(), telemetry.metrics_handle());
    let app = router(state)
        .into_make_service_with_connect_info::<SocketAddr>();

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(logger.clone()))
        .await;
    if let Err(e) = &served {
        logger.error(&cx, "server error", &[Field::new("error", e)]);
    }

    logger.info(&cx, "shutting down", &[]);
    if let Err(e) = telemetry.shutdown() {
        let fields = [Field::new("error", &e)];
        logger.error(&cx, "failed to shutdown telemetry", &fields);
    }
    logger.sync();

    served.context("server error")
}
