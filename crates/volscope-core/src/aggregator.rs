//! Cluster-wide volume usage collection.
//!
//! A collection lists the nodes, fetches and decodes each node's summary and
//! resolves every claim-backed volume to its device attributes. Only a
//! topology failure aborts; an unreachable or garbled node is skipped and an
//! unresolvable claim degrades to sentinel attributes.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::decoder;
use crate::error::{CollectResult, TelemetryUnavailable};
use crate::model::{NodeDescriptor, VolumeAttributes, VolumeUsageRecord};
use crate::resolver::VolumeAttributeResolver;
use crate::source::{ClaimResolver, TelemetryClient, TopologySource};

/// Tuning for a collection pass.
#[derive(Clone, Debug)]
pub struct CollectOptions {
    /// Nodes fetched concurrently. Zero is treated as one.
    pub max_concurrent_nodes: usize,
    /// Budget for one node: the summary fetch plus resolving its claims.
    pub node_timeout: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            max_concurrent_nodes: 8,
            node_timeout: Duration::from_secs(10),
        }
    }
}

/// Counters describing how a collection went.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectStats {
    /// Nodes returned by the topology source.
    pub nodes_listed: usize,
    /// Nodes whose summary could not be fetched.
    pub nodes_unreachable: usize,
    /// Nodes whose summary could not be decoded.
    pub nodes_undecodable: usize,
    /// Records produced.
    pub volumes_reported: usize,
    /// Records carrying the unresolved sentinels.
    pub volumes_unresolved: usize,
}

/// Records from one collection together with its counters.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    /// Records in node order, then payload order.
    pub records: Vec<VolumeUsageRecord>,
    /// Collection counters.
    pub stats: CollectStats,
}

enum NodeOutcome {
    Collected {
        records: Vec<VolumeUsageRecord>,
        unresolved: usize,
    },
    Unreachable,
    Undecodable,
}

/// Joins topology, telemetry and claim data into usage records.
pub struct MetricsAggregator {
    topology: Arc<dyn TopologySource>,
    telemetry: Arc<dyn TelemetryClient>,
    resolver: VolumeAttributeResolver,
    options: CollectOptions,
}

impl MetricsAggregator {
    /// Creates an aggregator with default options.
    pub fn new(
        topology: Arc<dyn TopologySource>,
        telemetry: Arc<dyn TelemetryClient>,
        claims: Arc<dyn ClaimResolver>,
    ) -> Self {
        Self {
            topology,
            telemetry,
            resolver: VolumeAttributeResolver::new(claims),
            options: CollectOptions::default(),
        }
    }

    /// Replaces the collection options.
    pub fn with_options(mut self, options: CollectOptions) -> Self {
        self.options = options;
        self
    }

    /// Collects usage records for every reachable node.
    pub async fn collect(&self) -> CollectResult<Vec<VolumeUsageRecord>> {
        Ok(self.collect_snapshot().await?.records)
    }

    /// Collects usage records and the counters describing the pass.
    pub async fn collect_snapshot(&self) -> CollectResult<Snapshot> {
        let nodes = self.topology.list_nodes().await?;
        debug!(nodes = nodes.len(), "listed cluster nodes");

        let concurrency = self.options.max_concurrent_nodes.max(1);
        let pending: Vec<_> = nodes.iter().map(|node| self.collect_node(node)).collect();
        let outcomes: Vec<NodeOutcome> = stream::iter(pending)
            .buffered(concurrency)
            .collect()
            .await;

        let mut snapshot = Snapshot {
            records: Vec::new(),
            stats: CollectStats {
                nodes_listed: nodes.len(),
                ..CollectStats::default()
            },
        };
        for outcome in outcomes {
            match outcome {
                NodeOutcome::Collected { records, unresolved } => {
                    snapshot.stats.volumes_unresolved += unresolved;
                    snapshot.records.extend(records);
                }
                NodeOutcome::Unreachable => snapshot.stats.nodes_unreachable += 1,
                NodeOutcome::Undecodable => snapshot.stats.nodes_undecodable += 1,
            }
        }
        snapshot.stats.volumes_reported = snapshot.records.len();

        info!(
            nodes = snapshot.stats.nodes_listed,
            unreachable = snapshot.stats.nodes_unreachable,
            undecodable = snapshot.stats.nodes_undecodable,
            volumes = snapshot.stats.volumes_reported,
            unresolved = snapshot.stats.volumes_unresolved,
            "volume usage collected"
        );
        Ok(snapshot)
    }

    async fn collect_node(&self, node: &NodeDescriptor) -> NodeOutcome {
        let deadline = Instant::now() + self.options.node_timeout;

        let payload = match self.fetch(&node.id, deadline).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(node = %node.id, error = %e, "skipping node: summary unavailable");
                return NodeOutcome::Unreachable;
            }
        };

        let decoded = decoder::decode(&payload);
        if let Some(e) = decoded.error {
            warn!(node = %node.id, error = %e, "skipping node: summary undecodable");
            return NodeOutcome::Undecodable;
        }

        let mut records = Vec::new();
        let mut unresolved = 0;
        for entry in decoded.entries.into_iter().filter(|e| e.has_claim()) {
            let attrs = match timeout_at(deadline, self.resolver.resolve(&entry.claim)).await {
                Ok(attrs) => attrs,
                Err(_) => {
                    warn!(
                        node = %node.id,
                        claim = %entry.claim,
                        "claim resolution exceeded node budget"
                    );
                    VolumeAttributes::unresolved()
                }
            };
            if attrs.is_unresolved() {
                unresolved += 1;
            }
            let record = VolumeUsageRecord::new(
                node,
                &entry.claim,
                entry.used_bytes,
                entry.capacity_bytes,
                attrs,
            );
            records.push(record.with_pod(entry.pod));
        }
        debug!(node = %node.id, volumes = records.len(), "node collected");

        NodeOutcome::Collected { records, unresolved }
    }

    async fn fetch(
        &self,
        node_id: &str,
        deadline: Instant,
    ) -> Result<Vec<u8>, TelemetryUnavailable> {
        match timeout_at(deadline, self.telemetry.fetch_summary(node_id)).await {
            Ok(result) => result,
            Err(_) => Err(TelemetryUnavailable::Timeout {
                node: node_id.to_string(),
                timeout_ms: self.options.node_timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DirectoryError, LookupError};
    use crate::model::{ClaimRecord, CsiDevice, VolumeRecord, REGION_LABEL};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};

    const GIB: u64 = 1 << 30;

    struct StaticTopology(Result<Vec<NodeDescriptor>, String>);

    #[async_trait]
    impl TopologySource for StaticTopology {
        async fn list_nodes(&self) -> Result<Vec<NodeDescriptor>, DirectoryError> {
            self.0.clone().map_err(DirectoryError::Transport)
        }
    }

    #[derive(Default)]
    struct StaticTelemetry {
        payloads: HashMap<String, Vec<u8>>,
        slow: Vec<String>,
    }

    #[async_trait]
    impl TelemetryClient for StaticTelemetry {
        async fn fetch_summary(&self, node_id: &str) -> Result<Vec<u8>, TelemetryUnavailable> {
            if self.slow.iter().any(|n| n == node_id) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            self.payloads
                .get(node_id)
                .cloned()
                .ok_or_else(|| TelemetryUnavailable::Unreachable {
                    node: node_id.to_string(),
                    reason: "connection refused".to_string(),
                })
        }
    }

    #[derive(Default)]
    struct StaticClaims {
        claims: HashMap<(String, String), ClaimRecord>,
        volumes: HashMap<String, VolumeRecord>,
        stalled: bool,
    }

    #[async_trait]
    impl ClaimResolver for StaticClaims {
        async fn get_claim(
            &self,
            namespace: &str,
            name: &str,
        ) -> Result<Option<ClaimRecord>, LookupError> {
            if self.stalled {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Ok(self.claims.get(&(namespace.to_string(), name.to_string())).cloned())
        }

        async fn get_volume(&self, volume_id: &str) -> Result<Option<VolumeRecord>, LookupError> {
            Ok(self.volumes.get(volume_id).cloned())
        }
    }

    fn summary(volumes: &[(&str, &str, u64, u64)]) -> Vec<u8> {
        let vols: Vec<serde_json::Value> = volumes
            .iter()
            .map(|(ns, name, used, cap)| {
                if name.is_empty() {
                    serde_json::json!({"name": "scratch", "usedBytes": used, "capacityBytes": cap})
                } else {
                    serde_json::json!({
                        "name": "data",
                        "usedBytes": used,
                        "capacityBytes": cap,
                        "pvcRef": {"name": name, "namespace": ns}
                    })
                }
            })
            .collect();
        serde_json::to_vec(&serde_json::json!({
            "pods": [{"podRef": {"name": "p", "namespace": "ns1"}, "volume": vols}]
        }))
        .unwrap()
    }

    fn encrypted_claims() -> StaticClaims {
        let mut claims = StaticClaims::default();
        claims.claims.insert(("ns1".into(), "pvc-a".into()), ClaimRecord::bound("pv-a"));
        claims.volumes.insert(
            "pv-a".into(),
            VolumeRecord {
                csi: Some(CsiDevice {
                    volume_handle: "vol-0a".into(),
                    attributes: BTreeMap::from([("encrypted".to_string(), "true".to_string())]),
                }),
                annotations: BTreeMap::new(),
            },
        );
        claims
    }

    fn aggregator(
        nodes: Result<Vec<NodeDescriptor>, String>,
        telemetry: StaticTelemetry,
        claims: StaticClaims,
    ) -> MetricsAggregator {
        MetricsAggregator::new(
            Arc::new(StaticTopology(nodes)),
            Arc::new(telemetry),
            Arc::new(claims),
        )
    }

    #[tokio::test]
    async fn test_end_to_end_one_node_down() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", 5 * GIB, 10 * GIB)]));

        let agg = aggregator(
            Ok(vec![NodeDescriptor::new("A"), NodeDescriptor::new("B")]),
            telemetry,
            encrypted_claims(),
        );
        let records = agg.collect().await.unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.namespace, "ns1");
        assert_eq!(r.name, "pvc-a");
        assert_eq!(r.node, "A");
        assert_eq!(r.pod, "ns1/p");
        assert_eq!(r.used_gb, 5.0);
        assert_eq!(r.total_gb, 10.0);
        assert_eq!(r.percent, 50.0);
        assert!(r.encrypted);
        assert_eq!(r.volume_id, "vol-0a");
        assert_eq!(r.iops, "3000");
        assert_eq!(r.throughput, "125");
    }

    #[tokio::test]
    async fn test_topology_failure_is_fatal() {
        let agg = aggregator(
            Err("apiserver unreachable".into()),
            StaticTelemetry::default(),
            StaticClaims::default(),
        );
        assert!(agg.collect().await.is_err());
    }

    #[tokio::test]
    async fn test_no_nodes_is_empty_report() {
        let agg = aggregator(Ok(vec![]), StaticTelemetry::default(), StaticClaims::default());
        let snapshot = agg.collect_snapshot().await.unwrap();
        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.stats, CollectStats::default());
    }

    #[tokio::test]
    async fn test_volumes_without_claim_are_dropped() {
        let mut telemetry = StaticTelemetry::default();
        telemetry.payloads.insert(
            "A".into(),
            summary(&[("", "", GIB, 2 * GIB), ("ns1", "pvc-a", GIB, 2 * GIB), ("", "", 0, 0)]),
        );
        let agg = aggregator(Ok(vec![NodeDescriptor::new("A")]), telemetry, encrypted_claims());
        let records = agg.collect().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "pvc-a");
    }

    #[tokio::test]
    async fn test_unresolved_claim_still_reported() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns9", "pvc-unknown", GIB, 4 * GIB)]));
        let agg = aggregator(
            Ok(vec![NodeDescriptor::new("A")]),
            telemetry,
            StaticClaims::default(),
        );
        let snapshot = agg.collect_snapshot().await.unwrap();

        assert_eq!(snapshot.records.len(), 1);
        let r = &snapshot.records[0];
        assert_eq!(r.volume_id, "fetching...");
        assert!(!r.encrypted);
        assert_eq!(r.iops, "---");
        assert_eq!(r.throughput, "---");
        assert_eq!(r.percent, 25.0);
        assert_eq!(snapshot.stats.volumes_unresolved, 1);
    }

    #[tokio::test]
    async fn test_same_claim_on_two_nodes_not_deduplicated() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        telemetry
            .payloads
            .insert("B".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        let agg = aggregator(
            Ok(vec![NodeDescriptor::new("A"), NodeDescriptor::new("B")]),
            telemetry,
            encrypted_claims(),
        );
        let records = agg.collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].node, "A");
        assert_eq!(records[1].node, "B");
    }

    #[tokio::test]
    async fn test_shared_claim_on_one_node_keeps_pods_apart() {
        let volume = serde_json::json!({
            "name": "data",
            "usedBytes": GIB,
            "capacityBytes": 10 * GIB,
            "pvcRef": {"name": "pvc-a", "namespace": "ns1"}
        });
        let payload = serde_json::json!({"pods": [
            {"podRef": {"name": "web-0", "namespace": "ns1"}, "volume": [volume.clone()]},
            {"podRef": {"name": "web-1", "namespace": "ns1"}, "volume": [volume]}
        ]});
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), serde_json::to_vec(&payload).unwrap());
        let agg = aggregator(Ok(vec![NodeDescriptor::new("A")]), telemetry, encrypted_claims());

        let records = agg.collect().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].pod, "ns1/web-0");
        assert_eq!(records[1].pod, "ns1/web-1");
        assert_eq!(records[0].name, records[1].name);
    }

    #[tokio::test]
    async fn test_stalled_resolution_bounded_by_node_timeout() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", GIB, 4 * GIB)]));
        let claims = StaticClaims {
            stalled: true,
            ..encrypted_claims()
        };
        let agg = aggregator(Ok(vec![NodeDescriptor::new("A")]), telemetry, claims).with_options(
            CollectOptions {
                max_concurrent_nodes: 1,
                node_timeout: Duration::from_millis(50),
            },
        );

        let snapshot = tokio::time::timeout(Duration::from_secs(5), agg.collect_snapshot())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.records.len(), 1);
        let r = &snapshot.records[0];
        assert_eq!(r.volume_id, "fetching...");
        assert_eq!(r.iops, "---");
        assert_eq!(r.percent, 25.0);
        assert_eq!(snapshot.stats.volumes_unresolved, 1);
        assert_eq!(snapshot.stats.nodes_unreachable, 0);
    }

    #[tokio::test]
    async fn test_undecodable_node_skipped() {
        let mut telemetry = StaticTelemetry::default();
        telemetry.payloads.insert("A".into(), b"not json".to_vec());
        telemetry
            .payloads
            .insert("B".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        let agg = aggregator(
            Ok(vec![NodeDescriptor::new("A"), NodeDescriptor::new("B")]),
            telemetry,
            encrypted_claims(),
        );
        let snapshot = agg.collect_snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].node, "B");
        assert_eq!(snapshot.stats.nodes_listed, 2);
        assert_eq!(snapshot.stats.nodes_undecodable, 1);
        assert_eq!(snapshot.stats.nodes_unreachable, 0);
    }

    #[tokio::test]
    async fn test_region_taken_from_node_label() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        let node = NodeDescriptor::new("A").with_label(REGION_LABEL, "ap-southeast-2");
        let agg = aggregator(Ok(vec![node]), telemetry, encrypted_claims());
        let records = agg.collect().await.unwrap();
        assert_eq!(records[0].region, "ap-southeast-2");
    }

    #[tokio::test]
    async fn test_slow_node_times_out() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        telemetry
            .payloads
            .insert("B".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        telemetry.slow.push("B".into());

        let agg = aggregator(
            Ok(vec![NodeDescriptor::new("A"), NodeDescriptor::new("B")]),
            telemetry,
            encrypted_claims(),
        )
        .with_options(CollectOptions {
            max_concurrent_nodes: 2,
            node_timeout: Duration::from_millis(50),
        });
        let snapshot = agg.collect_snapshot().await.unwrap();
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].node, "A");
        assert_eq!(snapshot.stats.nodes_unreachable, 1);
    }

    #[tokio::test]
    async fn test_order_follows_topology_with_concurrency() {
        let mut telemetry = StaticTelemetry::default();
        let mut nodes = Vec::new();
        for i in 0..6 {
            let id = format!("node-{i}");
            telemetry
                .payloads
                .insert(id.clone(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
            nodes.push(NodeDescriptor::new(id));
        }
        let agg = aggregator(Ok(nodes), telemetry, encrypted_claims()).with_options(CollectOptions {
            max_concurrent_nodes: 3,
            node_timeout: Duration::from_secs(5),
        });
        let records = agg.collect().await.unwrap();
        let order: Vec<&str> = records.iter().map(|r| r.node.as_str()).collect();
        assert_eq!(order, vec!["node-0", "node-1", "node-2", "node-3", "node-4", "node-5"]);
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_collects() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", GIB, 10 * GIB)]));
        let agg = aggregator(Ok(vec![NodeDescriptor::new("A")]), telemetry, encrypted_claims())
            .with_options(CollectOptions {
                max_concurrent_nodes: 0,
                node_timeout: Duration::from_secs(5),
            });
        assert_eq!(agg.collect().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_collections_are_idempotent() {
        let mut telemetry = StaticTelemetry::default();
        telemetry
            .payloads
            .insert("A".into(), summary(&[("ns1", "pvc-a", 3 * GIB, 10 * GIB)]));
        let agg = aggregator(Ok(vec![NodeDescriptor::new("A")]), telemetry, encrypted_claims());
        let first = agg.collect().await.unwrap();
        let second = agg.collect().await.unwrap();
        assert_eq!(first, second);
    }
}
