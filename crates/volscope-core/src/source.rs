//! Interfaces to the collaborators the aggregator reads from.
//!
//! Implementations live outside this crate: the server crate backs them with
//! the Kubernetes API and the kubelet, tests back them with in-memory maps.

use async_trait::async_trait;

use crate::error::{DirectoryError, LookupError, TelemetryUnavailable};
use crate::model::{ClaimRecord, NodeDescriptor, VolumeRecord};

/// Enumerates cluster nodes.
#[async_trait]
pub trait TopologySource: Send + Sync {
    /// Lists every node with its labels.
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, DirectoryError>;
}

/// Fetches a node's raw usage summary.
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Returns the summary payload exactly as the agent sent it.
    async fn fetch_summary(&self, node_id: &str) -> Result<Vec<u8>, TelemetryUnavailable>;
}

/// Looks up claims and the volumes bound to them.
///
/// Not-found is `Ok(None)`; `Err` is reserved for transport failures.
#[async_trait]
pub trait ClaimResolver: Send + Sync {
    /// Fetches a claim by namespace and name.
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClaimRecord>, LookupError>;

    /// Fetches a cluster-scoped volume by name.
    async fn get_volume(&self, volume_id: &str) -> Result<Option<VolumeRecord>, LookupError>;
}
