//! Cluster state backed by the Kubernetes API

use async_trait::async_trait;
use kube::api::{DeleteParams, DynamicObject, ListParams, PostParams};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use interruptd_core::cluster::{ClusterError, ClusterState};
use interruptd_core::model::{Node, NodeClaim};

use super::client::{K8sClient, NODECLAIM_KIND};

/// [`ClusterState`] over NodeClaim custom resources and core Nodes
pub struct KubeClusterState {
    client: K8sClient,
}

impl KubeClusterState {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }
}

/// Convert between serde-compatible representations of the same object
fn convert<T: Serialize, U: DeserializeOwned>(from: &T) -> Result<U, serde_json::Error> {
    serde_json::to_value(from).and_then(serde_json::from_value)
}

/// Whether a kube error is an API 404
fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

/// Decode a listed NodeClaim
pub fn node_claim_from_dynamic(obj: &DynamicObject) -> Result<NodeClaim, serde_json::Error> {
    convert(obj)
}

/// Encode a NodeClaim for the API, stamping the type meta
pub fn node_claim_to_dynamic(
    claim: &NodeClaim,
    api_version: &str,
) -> Result<DynamicObject, serde_json::Error> {
    let mut value = serde_json::to_value(claim)?;
    if let Some(object) = value.as_object_mut() {
        object.insert("apiVersion".to_string(), api_version.into());
        object.insert("kind".to_string(), NODECLAIM_KIND.into());
    }
    serde_json::from_value(value)
}

/// Decode a core Node
pub fn node_from_k8s(node: &k8s_openapi::api::core::v1::Node) -> Result<Node, serde_json::Error> {
    convert(node)
}

#[async_trait]
impl ClusterState for KubeClusterState {
    async fn list_node_claims(&self) -> Result<Vec<NodeClaim>, ClusterError> {
        let list = self
            .client
            .node_claims()
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::List {
                kind: "NodeClaim",
                reason: e.to_string(),
            })?;

        let mut claims = Vec::with_capacity(list.items.len());
        for obj in &list.items {
            match node_claim_from_dynamic(obj) {
                Ok(claim) => claims.push(claim),
                Err(e) => warn!(
                    nodeclaim = obj.metadata.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Skipping undecodable nodeclaim"
                ),
            }
        }
        Ok(claims)
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        let list = self
            .client
            .nodes()
            .list(&ListParams::default())
            .await
            .map_err(|e| ClusterError::List {
                kind: "Node",
                reason: e.to_string(),
            })?;

        let mut nodes = Vec::with_capacity(list.items.len());
        for node in &list.items {
            match node_from_k8s(node) {
                Ok(node) => nodes.push(node),
                Err(e) => warn!(
                    node = node.metadata.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Skipping undecodable node"
                ),
            }
        }
        Ok(nodes)
    }

    async fn delete_node_claim(&self, claim: &NodeClaim) -> Result<(), ClusterError> {
        match self
            .client
            .node_claims()
            .delete(claim.name(), &DeleteParams::default())
            .await
        {
            Ok(_) => {
                debug!(nodeclaim = claim.name(), "Deleted nodeclaim");
                Ok(())
            }
            Err(e) if is_not_found(&e) => Err(ClusterError::NotFound {
                kind: "NodeClaim",
                name: claim.name().to_string(),
            }),
            Err(e) => Err(ClusterError::Api {
                operation: "deleting",
                kind: "NodeClaim",
                name: claim.name().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn create_node_claim(&self, claim: &NodeClaim) -> Result<NodeClaim, ClusterError> {
        let api_error = |reason: String| ClusterError::Api {
            operation: "creating",
            kind: "NodeClaim",
            name: claim.metadata.generate_name.clone(),
            reason,
        };

        let obj = node_claim_to_dynamic(claim, &self.client.node_claim_resource().api_version)
            .map_err(|e| api_error(e.to_string()))?;
        let created = self
            .client
            .node_claims()
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| api_error(e.to_string()))?;
        node_claim_from_dynamic(&created).map_err(|e| api_error(e.to_string()))
    }
}
