//! Instance correlation
//!
//! Events name cloud instances, the cluster names NodeClaims and Nodes. The
//! index maps one to the other and is rebuilt from a full listing every cycle.

use std::collections::HashMap;

use tracing::trace;

use crate::cluster::{ClusterError, ClusterState};
use crate::model::{Node, NodeClaim};

/// Instance id to cluster record lookups for one reconciliation cycle
#[derive(Debug, Default, Clone)]
pub struct CorrelationIndex {
    node_claims: HashMap<String, NodeClaim>,
    nodes: HashMap<String, Node>,
}

impl CorrelationIndex {
    /// List NodeClaims and Nodes and index them by instance id
    pub async fn build(cluster: &dyn ClusterState) -> Result<Self, ClusterError> {
        let node_claims = cluster.list_node_claims().await?;
        let nodes = cluster.list_nodes().await?;
        Ok(Self::from_snapshot(node_claims, nodes))
    }

    /// Index an already listed snapshot. Records without a parseable
    /// provider id are not bound to an instance yet and are skipped.
    pub fn from_snapshot(node_claims: Vec<NodeClaim>, nodes: Vec<Node>) -> Self {
        let node_claims: HashMap<_, _> = node_claims
            .into_iter()
            .filter_map(|claim| match claim.instance_id() {
                Some(id) => Some((id, claim)),
                None => {
                    trace!(nodeclaim = claim.name(), "Skipping unbound NodeClaim");
                    None
                }
            })
            .collect();
        let nodes: HashMap<_, _> = nodes
            .into_iter()
            .filter_map(|node| node.instance_id().map(|id| (id, node)))
            .collect();

        Self { node_claims, nodes }
    }

    pub fn node_claim(&self, instance_id: &str) -> Option<&NodeClaim> {
        self.node_claims.get(instance_id)
    }

    pub fn node(&self, instance_id: &str) -> Option<&Node> {
        self.nodes.get(instance_id)
    }

    pub fn node_claim_count(&self) -> usize {
        self.node_claims.len()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{node, node_claim, FakeClusterState};

    #[test]
    fn test_index_by_instance_id() {
        let index = CorrelationIndex::from_snapshot(
            vec![
                node_claim("claim-a", "aws:///us-east-1a/i-aaa"),
                node_claim("claim-b", "aws:///us-east-1b/i-bbb"),
            ],
            vec![node("node-a", "aws:///us-east-1a/i-aaa")],
        );

        assert_eq!(index.node_claim_count(), 2);
        assert_eq!(index.node_count(), 1);
        assert_eq!(index.node_claim("i-aaa").unwrap().name(), "claim-a");
        assert_eq!(index.node("i-aaa").unwrap().name(), "node-a");
        assert!(index.node("i-bbb").is_none());
        assert!(index.node_claim("i-ccc").is_none());
    }

    #[test]
    fn test_unbound_and_malformed_records_skipped() {
        let index = CorrelationIndex::from_snapshot(
            vec![
                node_claim("unbound", ""),
                node_claim("malformed", "kind://not-aws"),
                node_claim("bound", "aws:///us-east-1a/i-aaa"),
            ],
            vec![node("empty", ""), node("bad", "aws:///us-east-1a/")],
        );

        assert_eq!(index.node_claim_count(), 1);
        assert_eq!(index.node_count(), 0);
    }

    #[tokio::test]
    async fn test_build_propagates_listing_failure() {
        let cluster = FakeClusterState::new();
        cluster.set_fail_list(true);
        assert!(CorrelationIndex::build(&cluster).await.is_err());
    }

    #[tokio::test]
    async fn test_build_from_cluster() {
        let cluster = FakeClusterState::new();
        cluster.add_node_claim(node_claim("claim-a", "aws:///us-east-1a/i-aaa"));
        cluster.add_node(node("node-a", "aws:///us-east-1a/i-aaa"));

        let index = CorrelationIndex::build(&cluster).await.unwrap();
        assert_eq!(index.node_claim("i-aaa").unwrap().name(), "claim-a");
        assert_eq!(index.node("i-aaa").unwrap().name(), "node-a");
    }
}
