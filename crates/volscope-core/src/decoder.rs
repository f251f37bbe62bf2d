//! Kubelet summary decoding.
//!
//! The summary API returns far more than we need; only pod volume usage is
//! kept. Any field may be missing: numbers default to zero and strings to
//! empty, so a pod with an ephemeral volume decodes to an entry with an
//! empty claim name. A payload that is not a summary at all yields no
//! entries and a [`DecodeError`].

use serde::Deserialize;

use crate::error::DecodeError;
use crate::model::ClaimRef;

/// One pod volume with its usage counters.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeUsageEntry {
    /// Owning pod, `namespace/name`.
    pub pod: String,
    /// Volume name inside the pod spec.
    pub volume: String,
    /// Claim backing the volume; empty name for non-claim volumes.
    pub claim: ClaimRef,
    /// Bytes in use.
    pub used_bytes: u64,
    /// Bytes provisioned.
    pub capacity_bytes: u64,
}

impl VolumeUsageEntry {
    /// Whether this entry is backed by a claim and should be reported.
    pub fn has_claim(&self) -> bool {
        !self.claim.name.is_empty()
    }
}

/// Result of decoding one node's payload.
#[derive(Debug, Default)]
pub struct DecodedSummary {
    /// Volume entries in payload order.
    pub entries: Vec<VolumeUsageEntry>,
    /// Set when the payload was rejected; `entries` is then empty.
    pub error: Option<DecodeError>,
}

#[derive(Deserialize)]
struct Summary {
    #[serde(default)]
    pods: Option<Vec<PodStats>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStats {
    #[serde(default)]
    pod_ref: Option<ObjectRef>,
    #[serde(default)]
    volume: Option<Vec<VolumeStats>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeStats {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    capacity_bytes: Option<u64>,
    #[serde(default)]
    used_bytes: Option<u64>,
    #[serde(default)]
    pvc_ref: Option<ObjectRef>,
}

#[derive(Deserialize, Default)]
struct ObjectRef {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    namespace: Option<String>,
}

/// Decodes a summary payload into volume usage entries.
pub fn decode(payload: &[u8]) -> DecodedSummary {
    match serde_json::from_slice::<Summary>(payload) {
        Ok(summary) => DecodedSummary {
            entries: flatten(summary),
            error: None,
        },
        Err(e) => DecodedSummary {
            entries: Vec::new(),
            error: Some(DecodeError::from(e)),
        },
    }
}

fn flatten(summary: Summary) -> Vec<VolumeUsageEntry> {
    let mut entries = Vec::new();
    for pod in summary.pods.unwrap_or_default() {
        let pod_ref = pod.pod_ref.unwrap_or_default();
        let pod_name = format!(
            "{}/{}",
            pod_ref.namespace.unwrap_or_default(),
            pod_ref.name.unwrap_or_default()
        );

        for vol in pod.volume.unwrap_or_default() {
            let pvc = vol.pvc_ref.unwrap_or_default();
            entries.push(VolumeUsageEntry {
                pod: pod_name.clone(),
                volume: vol.name.unwrap_or_default(),
                claim: ClaimRef {
                    name: pvc.name.unwrap_or_default(),
                    namespace: pvc.namespace.unwrap_or_default(),
                },
                used_bytes: vol.used_bytes.unwrap_or(0),
                capacity_bytes: vol.capacity_bytes.unwrap_or(0),
            });
        }
    }
    entries
}
