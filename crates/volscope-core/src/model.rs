//! Records exchanged between the collaborators and the aggregator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Node label holding the cloud region.
pub const REGION_LABEL: &str = "topology.kubernetes.io/region";

/// Annotation carrying provisioned IOPS on a volume.
pub const IOPS_ANNOTATION: &str = "ebs.csi.aws.com/iops";

/// Annotation carrying provisioned throughput (MiB/s) on a volume.
pub const THROUGHPUT_ANNOTATION: &str = "ebs.csi.aws.com/throughput";

/// CSI attribute key inspected for the encryption flag.
pub const ENCRYPTED_ATTRIBUTE: &str = "encrypted";

/// Device handle reported while a claim cannot be resolved.
pub const PENDING_VOLUME_ID: &str = "fetching...";

/// Performance value reported while a claim cannot be resolved.
pub const UNKNOWN_PERFORMANCE: &str = "---";

/// Baseline IOPS of a gp3 volume without an override annotation.
pub const DEFAULT_IOPS: &str = "3000";

/// Baseline throughput of a gp3 volume without an override annotation.
pub const DEFAULT_THROUGHPUT: &str = "125";

const BYTES_PER_GIB: f64 = (1u64 << 30) as f64;

/// A cluster node as reported by the topology source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node name, used to address its telemetry agent.
    pub id: String,
    /// Node labels.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodeDescriptor {
    /// Creates a descriptor without labels.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Adds a label, builder style.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Region label, or the empty string when the node carries none.
    pub fn region(&self) -> &str {
        self.labels.get(REGION_LABEL).map(String::as_str).unwrap_or("")
    }
}

/// Reference from a pod volume to its claim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClaimRef {
    /// Claim name.
    pub name: String,
    /// Claim namespace.
    pub namespace: String,
}

impl ClaimRef {
    /// Creates a claim reference.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl std::fmt::Display for ClaimRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The subset of a claim the resolver needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClaimRecord {
    /// Name of the bound volume; `None` or empty while the claim is pending.
    pub volume_name: Option<String>,
}

impl ClaimRecord {
    /// A claim bound to `volume_name`.
    pub fn bound(volume_name: impl Into<String>) -> Self {
        Self {
            volume_name: Some(volume_name.into()),
        }
    }

    /// A claim not yet bound to any volume.
    pub fn pending() -> Self {
        Self { volume_name: None }
    }

    /// Bound volume name, if the claim is bound.
    pub fn bound_volume(&self) -> Option<&str> {
        self.volume_name.as_deref().filter(|name| !name.is_empty())
    }
}

/// CSI device block of a volume.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CsiDevice {
    /// Driver-specific handle, e.g. an EBS volume id.
    pub volume_handle: String,
    /// Driver attributes.
    pub attributes: BTreeMap<String, String>,
}

/// The subset of a volume the resolver needs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeRecord {
    /// Present only for CSI-provisioned volumes.
    pub csi: Option<CsiDevice>,
    /// Object annotations.
    pub annotations: BTreeMap<String, String>,
}

/// Device-level attributes attached to every record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VolumeAttributes {
    /// Device handle, or [`PENDING_VOLUME_ID`].
    pub volume_id: String,
    /// Exact-match encryption flag.
    pub encrypted: bool,
    /// Provisioned IOPS as reported, never parsed.
    pub iops: String,
    /// Provisioned throughput as reported, never parsed.
    pub throughput: String,
}

impl VolumeAttributes {
    /// Attributes for a claim that could not be resolved.
    pub fn unresolved() -> Self {
        Self {
            volume_id: PENDING_VOLUME_ID.to_string(),
            encrypted: false,
            iops: UNKNOWN_PERFORMANCE.to_string(),
            throughput: UNKNOWN_PERFORMANCE.to_string(),
        }
    }

    /// True when these are exactly the unresolved sentinels.
    pub fn is_unresolved(&self) -> bool {
        *self == Self::unresolved()
    }
}

impl Default for VolumeAttributes {
    fn default() -> Self {
        Self::unresolved()
    }
}

/// One row of the utilization report.
///
/// Serializes with the field names the front end expects. Raw byte
/// counters are kept for exporters but stay off the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VolumeUsageRecord {
    /// Claim namespace.
    pub namespace: String,
    /// Claim name.
    pub name: String,
    /// Node reporting the usage.
    pub node: String,
    /// Pod mounting the claim, `namespace/name`.
    #[serde(skip)]
    pub pod: String,
    /// Bytes in use.
    #[serde(skip)]
    pub used_bytes: u64,
    /// Bytes provisioned.
    #[serde(skip)]
    pub capacity_bytes: u64,
    /// Used GiB.
    pub used_gb: f64,
    /// Provisioned GiB.
    pub total_gb: f64,
    /// `used_gb / total_gb * 100`, or 0 when nothing is provisioned.
    pub percent: f64,
    /// Device handle.
    pub volume_id: String,
    /// Region of the reporting node.
    pub region: String,
    /// Provisioned IOPS.
    pub iops: String,
    /// Provisioned throughput.
    pub throughput: String,
    /// Whether the device is encrypted.
    pub encrypted: bool,
}

impl VolumeUsageRecord {
    /// Builds a record from usage counters and resolved attributes.
    pub fn new(
        node: &NodeDescriptor,
        claim: &ClaimRef,
        used_bytes: u64,
        capacity_bytes: u64,
        attrs: VolumeAttributes,
    ) -> Self {
        let used_gb = bytes_to_gib(used_bytes);
        let total_gb = bytes_to_gib(capacity_bytes);
        Self {
            namespace: claim.namespace.clone(),
            name: claim.name.clone(),
            node: node.id.clone(),
            pod: String::new(),
            used_bytes,
            capacity_bytes,
            used_gb,
            total_gb,
            percent: usage_percent(used_gb, total_gb),
            volume_id: attrs.volume_id,
            region: node.region().to_string(),
            iops: attrs.iops,
            throughput: attrs.throughput,
            encrypted: attrs.encrypted,
        }
    }

    /// Sets the mounting pod, builder style.
    pub fn with_pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = pod.into();
        self
    }
}

/// Converts bytes to GiB.
pub fn bytes_to_gib(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_GIB
}

/// Usage percentage; zero when `total` is not positive.
pub fn usage_percent(used: f64, total: f64) -> f64 {
    if total > 0.0 {
        used / total * 100.0
    } else {
        0.0
    }
}
