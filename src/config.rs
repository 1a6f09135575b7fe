// SPDX-License-Identifier: MIT
//! Runtime configuration sourced from environment variables.
//!
//! Every field falls back to a fixed default when its variable is absent. A variable that
//! is set to an empty string is taken as-is; no validation happens here.

/// Output format of the process-wide log subscriber.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Compact single-line console output with file/line/thread id.
    Compact,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("compact") {
            LogFormat::Compact
        } else {
            LogFormat::Json
        }
    }
}

/// Configuration used when starting the service.
///
/// Values are sourced from environment variables if available:
/// * `LISTEN_ADDR` – listen address, a bare `:port` binds all interfaces (default `:8080`).
/// * `OTEL_EXPORTER` – trace exporter kind (default `otlp`).
/// * `OTEL_SERVICE_NAME` – service name resource attribute (default `template-go`).
/// * `OTEL_EXPORTER_OTLP_ENDPOINT` – base OTLP endpoint (default `http://localhost:4318`).
/// * `RUST_ENV` – deployment environment, added as `deployment.environment` (default `dev`).
/// * `LOG_FORMAT` – `json` or `compact` (default `json`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    pub listen_addr: String,
    pub exporter: String,
    pub service_name: String,
    /// Base OTLP endpoint (without per-signal suffix). Example: `http://localhost:4318`.
    pub otlp_endpoint: String,
    /// Reported as `service.version`; always the crate version.
    pub service_version: String,
    pub environment: String,
    pub log_format: LogFormat,
}

pub const DEFAULT_LISTEN_ADDR: &str = ":8080";
pub const DEFAULT_EXPORTER: &str = "otlp";
pub const DEFAULT_SERVICE_NAME: &str = "template-go";
pub const DEFAULT_OTLP_ENDPOINT: &str = "http://localhost:4318";
pub const DEFAULT_ENVIRONMENT: &str = "dev";

impl ServiceConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// ```
    /// use otel_service_template::config::ServiceConfig;
    /// let cfg = ServiceConfig::from_lookup(|key| (key == "LISTEN_ADDR").then(|| ":9000".to_string()));
    /// assert_eq!(cfg.listen_addr, ":9000");
    /// assert_eq!(cfg.service_name, "template-go");
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());
        Self {
            listen_addr: var("LISTEN_ADDR", DEFAULT_LISTEN_ADDR),
            exporter: var("OTEL_EXPORTER", DEFAULT_EXPORTER),
            service_name: var("OTEL_SERVICE_NAME", DEFAULT_SERVICE_NAME),
            otlp_endpoint: var("OTEL_EXPORTER_OTLP_ENDPOINT", DEFAULT_OTLP_ENDPOINT),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            environment: var("RUST_ENV", DEFAULT_ENVIRONMENT),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::from_env_value(&v))
                .unwrap_or_default(),
        }
    }

    /// Address suitable for `TcpListener::bind`; `:8080` binds all interfaces.
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // Serializes tests that touch the real process environment.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 3] = ["LISTEN_ADDR", "OTEL_EXPORTER", "OTEL_SERVICE_NAME"];

    #[test]
    fn load_uses_defaults_when_unset() {
        let _guard = ENV_LOCK.lock().unwrap();
        for key in VARS {
            std::env::remove_var(key);
        }

        let cfg = ServiceConfig::load();

        assert_eq!(cfg.listen_addr, ":8080");
        assert_eq!(cfg.exporter, "otlp");
        assert_eq!(cfg.service_name, "template-go");
    }

    #[test]
    fn load_prefers_environment_overrides() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("LISTEN_ADDR", "127.0.0.1:9090");
        std::env::set_var("OTEL_EXPORTER", "prometheus");
        std::env::set_var("OTEL_SERVICE_NAME", "custom-service");

        let cfg = ServiceConfig::load();

        for key in VARS {
            std::env::remove_var(key);
        }
        assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
        assert_eq!(cfg.exporter, "prometheus");
        assert_eq!(cfg.service_name, "custom-service");
    }

    #[test]
    fn empty_value_is_not_replaced_by_default() {
        let env = HashMap::from([("OTEL_SERVICE_NAME", String::new())]);
        let cfg = ServiceConfig::from_lookup(|k| env.get(k).cloned());
        assert_eq!(cfg.service_name, "");
        assert_eq!(cfg.listen_addr, ":8080");
    }

    #[test]
    fn ambient_fields_have_defaults() {
        let cfg = ServiceConfig::default();
        assert_eq!(cfg.otlp_endpoint, "http://localhost:4318");
        assert_eq!(cfg.environment, "dev");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.service_version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn log_format_parsing() {
        let env = HashMap::from([("LOG_FORMAT", "Compact".to_string())]);
        let cfg = ServiceConfig::from_lookup(|k| env.get(k).cloned());
        assert_eq!(cfg.log_format, LogFormat::Compact);

        let env = HashMap::from([("LOG_FORMAT", "xml".to_string())]);
        let cfg = ServiceConfig::from_lookup(|k| env.get(k).cloned());
        assert_eq!(cfg.log_format, LogFormat::Json);
    }

    #[test]
    fn bind_addr_expands_port_only_form() {
        let mut cfg = ServiceConfig::default();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        cfg.listen_addr = "127.0.0.1:9090".into();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:9090");
    }
}
