use crate::api::SnapshotApi;
use crate::config::ServerConfig;
use crate::directory::KubeDirectory;
use crate::kubelet::KubeletClient;
use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use volscope_core::{MetricsAggregator, TelemetryClient, VolumeUsageRecord};

#[derive(Parser)]
#[command(name = "volscope")]
#[command(about = "Cluster-wide persistent volume utilization", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Serve the snapshot API and the front end.
    Serve {
        #[arg(short, long, default_value = "/etc/volscope/volscope.toml")]
        config: PathBuf,
    },
    /// Collect once against the cluster and print the report.
    Snapshot {
        #[arg(short, long, default_value = "/etc/volscope/volscope.toml")]
        config: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Print the report served by a running instance.
    Show {
        #[arg(short, long, default_value = "http://localhost:8080")]
        server: String,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        match &self.command {
            Command::Serve { config } | Command::Snapshot { config, .. } => Some(config.as_path()),
            Command::Show { .. } => None,
        }
    }

    pub async fn run(self, config: ServerConfig) -> Result<()> {
        match self.command {
            Command::Serve { .. } => serve(config).await,
            Command::Snapshot { format, .. } => snapshot(config, format).await,
            Command::Show { ref server, format } => show(server, format).await,
        }
    }
}

/// Wires the Kubernetes directory and the configured summary source into an aggregator.
pub async fn build_aggregator(config: &ServerConfig) -> Result<MetricsAggregator> {
    let directory = Arc::new(KubeDirectory::try_default().await?);
    let telemetry: Arc<dyn TelemetryClient> = match KubeletClient::from_config(config)? {
        Some(kubelet) => Arc::new(kubelet),
        None => directory.clone(),
    };
    let aggregator = MetricsAggregator::new(directory.clone(), telemetry, directory);
    Ok(aggregator.with_options(config.collect_options()))
}

async fn serve(config: ServerConfig) -> Result<()> {
    let aggregator = Arc::new(build_aggregator(&config).await?);
    let api = SnapshotApi::new(aggregator, Arc::new(config));
    api.serve().await
}

async fn snapshot(config: ServerConfig, format: OutputFormat) -> Result<()> {
    let aggregator = build_aggregator(&config).await?;
    let records = aggregator.collect().await?;
    print_records(&records, format)
}

async fn show(server: &str, format: OutputFormat) -> Result<()> {
    let client = Client::new();
    let url = format!("{}/api/data", server.trim_end_matches('/'));

    let response = client.get(&url).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("Request failed: {}", response.status());
    }

    let records: Vec<VolumeUsageRecord> = response.json().await?;
    print_records(&records, format)
}

fn print_records(records: &[VolumeUsageRecord], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(records)?),
        OutputFormat::Table => print!("{}", render_table(records)),
    }
    Ok(())
}

pub fn render_table(records: &[VolumeUsageRecord]) -> String {
    let mut out = format!(
        "{:<16} {:<28} {:<24} {:>9} {:>9} {:>6} {:<22} {:<12} {:>6} {:>6} {:<5}\n",
        "NAMESPACE",
        "NAME",
        "NODE",
        "USED_GB",
        "TOTAL_GB",
        "USE%",
        "VOLUME_ID",
        "REGION",
        "IOPS",
        "TPUT",
        "ENC"
    );
    for r in records {
        out.push_str(&format!(
            "{:<16} {:<28} {:<24} {:>9.2} {:>9.2} {:>5.1}% {:<22} {:<12} {:>6} {:>6} {:<5}\n",
            r.namespace,
            r.name,
            r.node,
            r.used_gb,
            r.total_gb,
            r.percent,
            r.volume_id,
            r.region,
            r.iops,
            r.throughput,
            if r.encrypted { "yes" } else { "no" },
        ));
    }
    out
}
