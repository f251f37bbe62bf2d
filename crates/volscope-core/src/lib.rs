#![warn(missing_docs)]

//! volscope core: cluster-wide persistent volume utilization
//!
//! This crate joins three independent, partially reliable sources into one
//! usage report: the node directory, each node's kubelet summary and the
//! claim/volume objects behind every mounted claim. The sources are reached
//! through the traits in [`source`]; nothing here talks to a network.

pub mod aggregator;
pub mod decoder;
pub mod error;
pub mod model;
pub mod resolver;
pub mod source;

pub use aggregator::{CollectOptions, CollectStats, MetricsAggregator, Snapshot};
pub use decoder::{decode, DecodedSummary, VolumeUsageEntry};
pub use error::{
    CollectError, CollectResult, DecodeError, DirectoryError, LookupError, TelemetryUnavailable,
};
pub use model::{
    bytes_to_gib, usage_percent, ClaimRecord, ClaimRef, CsiDevice, NodeDescriptor,
    VolumeAttributes, VolumeRecord, VolumeUsageRecord, DEFAULT_IOPS, DEFAULT_THROUGHPUT,
    IOPS_ANNOTATION, PENDING_VOLUME_ID, REGION_LABEL, THROUGHPUT_ANNOTATION, UNKNOWN_PERFORMANCE,
};
pub use resolver::{resolve_attributes, VolumeAttributeResolver};
pub use source::{ClaimResolver, TelemetryClient, TopologySource};
