use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use volscope_core::CollectOptions;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config file extension: {0:?}")]
    UnsupportedExtension(String),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Where node summaries are read from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum TelemetryConfig {
    /// Through the API server's node proxy subresource.
    #[default]
    Proxy,
    /// Straight from each kubelet.
    Kubelet {
        #[serde(default = "default_summary_url_template")]
        summary_url_template: String,
        #[serde(default)]
        bearer_token_file: Option<PathBuf>,
    },
}

fn default_summary_url_template() -> String {
    String::from("http://{node}:10255/stats/summary")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub static_dir: PathBuf,
    pub node_timeout_secs: u64,
    pub max_concurrent_nodes: usize,
    pub telemetry: TelemetryConfig,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            static_dir: PathBuf::from("./frontend"),
            node_timeout_secs: 10,
            max_concurrent_nodes: 8,
            telemetry: TelemetryConfig::default(),
            log_format: LogFormat::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        let config: ServerConfig = match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents)?,
            "json" => serde_json::from_str(&contents)?,
            _ => return Err(ConfigError::UnsupportedExtension(ext.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node_timeout_secs == 0 {
            return Err(ConfigError::Invalid("node_timeout_secs must be positive".into()));
        }
        if self.static_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("static_dir must not be empty".into()));
        }
        if let TelemetryConfig::Kubelet { summary_url_template, .. } = &self.telemetry {
            if !summary_url_template.contains("{node}") {
                return Err(ConfigError::Invalid(format!(
                    "summary_url_template {summary_url_template:?} has no {{node}} placeholder"
                )));
            }
        }
        Ok(())
    }

    pub fn node_timeout(&self) -> Duration {
        Duration::from_secs(self.node_timeout_secs)
    }

    pub fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            max_concurrent_nodes: self.max_concurrent_nodes.max(1),
            node_timeout: self.node_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert_eq!(config.static_dir, PathBuf::from("./frontend"));
        assert_eq!(config.node_timeout_secs, 10);
        assert_eq!(config.max_concurrent_nodes, 8);
        assert_eq!(config.telemetry, TelemetryConfig::Proxy);
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_json() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        writeln!(
            file,
            r#"{{
                "bind_addr": "127.0.0.1:9000",
                "static_dir": "/srv/volscope",
                "node_timeout_secs": 3,
                "telemetry": {{"mode": "kubelet"}}
            }}"#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([127, 0, 0, 1], 9000)));
        assert_eq!(config.static_dir, PathBuf::from("/srv/volscope"));
        assert_eq!(config.node_timeout_secs, 3);
        assert_eq!(config.max_concurrent_nodes, 8);
        assert_eq!(
            config.telemetry,
            TelemetryConfig::Kubelet {
                summary_url_template: "http://{node}:10255/stats/summary".to_string(),
                bearer_token_file: None,
            }
        );
    }

    #[test]
    fn test_from_file_toml() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            r#"
bind_addr = "10.0.0.1:8080"
max_concurrent_nodes = 16
log_format = "json"

[telemetry]
mode = "kubelet"
summary_url_template = "https://{{node}}:10250/stats/summary"
bearer_token_file = "/var/run/secrets/kubernetes.io/serviceaccount/token"
            "#
        )
        .unwrap();

        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.bind_addr, SocketAddr::from(([10, 0, 0, 1], 8080)));
        assert_eq!(config.max_concurrent_nodes, 16);
        assert_eq!(config.log_format, LogFormat::Json);
        match config.telemetry {
            TelemetryConfig::Kubelet {
                summary_url_template,
                bearer_token_file,
            } => {
                assert_eq!(summary_url_template, "https://{node}:10250/stats/summary");
                assert_eq!(
                    bearer_token_file,
                    Some(PathBuf::from("/var/run/secrets/kubernetes.io/serviceaccount/token"))
                );
            }
            other => panic!("unexpected telemetry config: {:?}", other),
        }
    }

    #[test]
    fn test_from_file_proxy_mode() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[telemetry]\nmode = \"proxy\"").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.telemetry, TelemetryConfig::Proxy);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = NamedTempFile::with_suffix(".yaml").unwrap();
        let err = ServerConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedExtension(ext) if ext == "yaml"));
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let config = ServerConfig {
            telemetry: TelemetryConfig::Kubelet {
                summary_url_template: "http://kubelet/stats/summary".to_string(),
                bearer_token_file: None,
            },
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = ServerConfig {
            node_timeout_secs: 0,
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collect_options_clamps_concurrency() {
        let config = ServerConfig {
            max_concurrent_nodes: 0,
            node_timeout_secs: 4,
            ..ServerConfig::default()
        };
        let options = config.collect_options();
        assert_eq!(options.max_concurrent_nodes, 1);
        assert_eq!(options.node_timeout, Duration::from_secs(4));
    }
}
