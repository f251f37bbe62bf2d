//! Error types for the aggregation pipeline.
//!
//! Only [`CollectError`] ever reaches a caller of the aggregator. The other
//! variants are produced by the collaborator traits and absorbed per node or
//! per volume.

use thiserror::Error;

/// Result type alias for aggregator operations.
pub type CollectResult<T> = Result<T, CollectError>;

/// The node directory could not be listed.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Transport-level failure talking to the directory.
    #[error("directory transport error: {0}")]
    Transport(String),

    /// The directory rejected our credentials.
    #[error("directory access denied: {0}")]
    Unauthorized(String),
}

/// A node's telemetry summary could not be fetched.
#[derive(Debug, Error)]
pub enum TelemetryUnavailable {
    /// Connection refused, DNS failure, TLS failure and the like.
    #[error("telemetry for node {node} unreachable: {reason}")]
    Unreachable {
        /// Node identifier.
        node: String,
        /// Description of the failure.
        reason: String,
    },

    /// The agent answered with a non-success status.
    #[error("telemetry for node {node} returned HTTP {status}")]
    HttpStatus {
        /// Node identifier.
        node: String,
        /// HTTP status code.
        status: u16,
    },

    /// The fetch did not finish within the per-node budget.
    #[error("telemetry for node {node} timed out after {timeout_ms}ms")]
    Timeout {
        /// Node identifier.
        node: String,
        /// Budget that elapsed, in milliseconds.
        timeout_ms: u64,
    },
}

/// A claim or volume lookup failed for a reason other than not-found.
#[derive(Debug, Error)]
#[error("lookup of {kind} {key} failed: {reason}")]
pub struct LookupError {
    /// Object kind, e.g. `PersistentVolumeClaim`.
    pub kind: &'static str,
    /// Object key, `namespace/name` or just `name`.
    pub key: String,
    /// Description of the failure.
    pub reason: String,
}

/// A telemetry payload did not have the expected summary shape.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON or does not match the summary schema.
    #[error("malformed summary payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Fatal aggregation failure.
#[derive(Debug, Error)]
pub enum CollectError {
    /// Without a node list there is nothing to aggregate.
    #[error("cannot list cluster nodes: {0}")]
    Topology(#[from] DirectoryError),
}
