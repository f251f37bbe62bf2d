//! Kubernetes API server as node directory, claim resolver and summary proxy.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, ListParams};
use kube::Client;
use volscope_core::{
    ClaimRecord, ClaimResolver, CsiDevice, DirectoryError, LookupError, NodeDescriptor,
    TelemetryClient, TelemetryUnavailable, TopologySource, VolumeRecord,
};

#[derive(Clone)]
pub struct KubeDirectory {
    client: Client,
}

impl KubeDirectory {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from in-cluster credentials or the local kubeconfig.
    pub async fn try_default() -> anyhow::Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

pub fn node_descriptor(node: Node) -> NodeDescriptor {
    NodeDescriptor {
        id: node.metadata.name.unwrap_or_default(),
        labels: node.metadata.labels.unwrap_or_default(),
    }
}

pub fn claim_record(pvc: &PersistentVolumeClaim) -> ClaimRecord {
    ClaimRecord {
        volume_name: pvc.spec.as_ref().and_then(|spec| spec.volume_name.clone()),
    }
}

pub fn volume_record(pv: &PersistentVolume) -> VolumeRecord {
    let csi = pv
        .spec
        .as_ref()
        .and_then(|spec| spec.csi.as_ref())
        .map(|csi| CsiDevice {
            volume_handle: csi.volume_handle.clone(),
            attributes: csi.volume_attributes.clone().unwrap_or_default(),
        });
    VolumeRecord {
        csi,
        annotations: pv.metadata.annotations.clone().unwrap_or_default(),
    }
}

fn directory_error(err: kube::Error) -> DirectoryError {
    match err {
        kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 => {
            DirectoryError::Unauthorized(resp.message)
        }
        other => DirectoryError::Transport(other.to_string()),
    }
}

fn telemetry_error(node_id: &str, err: kube::Error) -> TelemetryUnavailable {
    match err {
        kube::Error::Api(resp) => TelemetryUnavailable::HttpStatus {
            node: node_id.to_string(),
            status: resp.code,
        },
        other => TelemetryUnavailable::Unreachable {
            node: node_id.to_string(),
            reason: other.to_string(),
        },
    }
}

#[async_trait]
impl TopologySource for KubeDirectory {
    async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, DirectoryError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await.map_err(directory_error)?;
        tracing::debug!("Found {} Node resources", list.items.len());
        Ok(list.items.into_iter().map(node_descriptor).collect())
    }
}

#[async_trait]
impl ClaimResolver for KubeDirectory {
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ClaimRecord>, LookupError> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        let pvc = api.get_opt(name).await.map_err(|e| LookupError {
            kind: "PersistentVolumeClaim",
            key: format!("{namespace}/{name}"),
            reason: e.to_string(),
        })?;
        Ok(pvc.as_ref().map(claim_record))
    }

    async fn get_volume(&self, volume_id: &str) -> Result<Option<VolumeRecord>, LookupError> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        let pv = api.get_opt(volume_id).await.map_err(|e| LookupError {
            kind: "PersistentVolume",
            key: volume_id.to_string(),
            reason: e.to_string(),
        })?;
        Ok(pv.as_ref().map(volume_record))
    }
}

/// Reads kubelet summaries through `/api/v1/nodes/{node}/proxy/stats/summary`.
#[async_trait]
impl TelemetryClient for KubeDirectory {
    async fn fetch_summary(&self, node_id: &str) -> Result<Vec<u8>, TelemetryUnavailable> {
        let path = format!("/api/v1/nodes/{}/proxy/stats/summary", node_id);
        let request = http::Request::get(path)
            .body(Vec::new())
            .map_err(|e| TelemetryUnavailable::Unreachable {
                node: node_id.to_string(),
                reason: e.to_string(),
            })?;
        let body = self
            .client
            .request_text(request)
            .await
            .map_err(|e| telemetry_error(node_id, e))?;
        Ok(body.into_bytes())
    }
}
