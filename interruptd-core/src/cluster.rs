//! Cluster state collaborator

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Node, NodeClaim};

/// Errors from the cluster state store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Object does not exist (already deleted)
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    /// Listing a resource failed
    #[error("listing {kind}: {reason}")]
    List { kind: &'static str, reason: String },

    /// Any other API failure
    #[error("{operation} {kind} {name}: {reason}")]
    Api {
        operation: &'static str,
        kind: &'static str,
        name: String,
        reason: String,
    },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Read/write access to NodeClaims and Nodes
#[async_trait]
pub trait ClusterState: Send + Sync {
    async fn list_node_claims(&self) -> Result<Vec<NodeClaim>, ClusterError>;

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError>;

    /// Delete a NodeClaim. Returns [`ClusterError::NotFound`] if it is already gone.
    async fn delete_node_claim(&self, claim: &NodeClaim) -> Result<(), ClusterError>;

    /// Create a NodeClaim, returning the stored object
    async fn create_node_claim(&self, claim: &NodeClaim) -> Result<NodeClaim, ClusterError>;
}
