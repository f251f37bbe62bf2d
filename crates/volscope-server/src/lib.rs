//! volscope server: Kubernetes adapters, kubelet client, snapshot API, CLI

pub mod api;
pub mod cli;
pub mod config;
pub mod directory;
pub mod exporter;
pub mod kubelet;
pub mod security;

pub use api::SnapshotApi;
pub use config::{ConfigError, LogFormat, ServerConfig, TelemetryConfig};
pub use directory::KubeDirectory;
pub use kubelet::KubeletClient;
