//! Client settings: built-in defaults, then an optional file named by
//! `SERVING_REGISTRY_CONFIG`, then `SERVING_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::resilience::RetryConfig;

pub const CONFIG_FILE_ENV: &str = "SERVING_REGISTRY_CONFIG";
pub const ENV_PREFIX: &str = "SERVING";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSettings {
    pub host: String,
    pub grpc_port: u16,
    pub rest_port: u16,
    pub registry_file: PathBuf,
    pub request_timeout_ms: u64,
    pub reload_retries: usize,
    pub retry_base_delay_ms: u64,
    pub json_log: bool,
    pub log_level: String,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            grpc_port: 8500,
            rest_port: 8501,
            registry_file: PathBuf::from("models.config"),
            request_timeout_ms: 10_000,
            reload_retries: 3,
            retry_base_delay_ms: 200,
            json_log: false,
            log_level: "info".into(),
        }
    }
}

impl ClientSettings {
    pub fn grpc_endpoint(&self) -> String { format!("http://{}:{}", self.host, self.grpc_port) }

    pub fn rest_base_url(&self) -> String { format!("http://{}:{}", self.host, self.rest_port) }

    pub fn request_timeout(&self) -> Duration { Duration::from_millis(self.request_timeout_ms) }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.reload_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..RetryConfig::default()
        }
    }
}

pub fn load_settings() -> Result<ClientSettings, config::ConfigError> {
    let file = std::env::var(CONFIG_FILE_ENV).ok();
    load_settings_from(file.as_deref())
}

/// Same layering as [`load_settings`] with an explicit settings file.
pub fn load_settings_from(file: Option<&str>) -> Result<ClientSettings, config::ConfigError> {
    let d = ClientSettings::default();
    let mut builder = config::Config::builder()
        .set_default("host", d.host.as_str())?
        .set_default("grpc_port", i64::from(d.grpc_port))?
        .set_default("rest_port", i64::from(d.rest_port))?
        .set_default("registry_file", d.registry_file.to_string_lossy().into_owned())?
        .set_default("request_timeout_ms", d.request_timeout_ms)?
        .set_default("reload_retries", d.reload_retries as u64)?
        .set_default("retry_base_delay_ms", d.retry_base_delay_ms)?
        .set_default("json_log", d.json_log)?
        .set_default("log_level", d.log_level.as_str())?;
    if let Some(file) = file {
        builder = builder.add_source(config::File::with_name(file).required(false));
    }
    builder = builder.add_source(
        config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );
    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_serving_ports() {
        let s = ClientSettings::default();
        assert_eq!(s.grpc_endpoint(), "http://localhost:8500");
        assert_eq!(s.rest_base_url(), "http://localhost:8501");
        assert_eq!(s.request_timeout(), Duration::from_secs(10));
        let retry = s.retry_config();
        assert_eq!(retry.max_retries, 3);
        assert_eq!(retry.base_delay, Duration::from_millis(200));
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "host: serving.internal\ngrpc_port: 9500\njson_log: true").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let s = load_settings_from(Some(&path)).unwrap();
        assert_eq!(s.host, "serving.internal");
        assert_eq!(s.grpc_port, 9500);
        assert!(s.json_log);
        assert_eq!(s.rest_port, 8501);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml").to_string_lossy().to_string();
        let s = load_settings_from(Some(&path)).unwrap();
        assert_eq!(s.grpc_port, 8500);
    }
}
