//! Kubernetes Client wrapper
//!
//! Provides typed access to Nodes and the NodeClaim custom resource.

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ApiResource, DynamicObject, GroupVersionKind, ListParams};
use kube::{Client, Config};
use tracing::info;

pub const NODECLAIM_GROUP: &str = "karpenter.sh";
pub const NODECLAIM_VERSION: &str = "v1beta1";
pub const NODECLAIM_KIND: &str = "NodeClaim";
pub const NODECLAIM_PLURAL: &str = "nodeclaims";

/// API resource description of NodeClaims
pub fn node_claim_resource() -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind::gvk(NODECLAIM_GROUP, NODECLAIM_VERSION, NODECLAIM_KIND),
        NODECLAIM_PLURAL,
    )
}

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    node_claim_resource: ApiResource,
}

impl K8sClient {
    /// Create a new K8s client using in-cluster config or the local kubeconfig
    pub async fn new() -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        info!("Connected to Kubernetes API server");
        Ok(Self::from_client(client))
    }

    /// Create a new K8s client with custom config
    pub fn with_config(config: Config) -> Result<Self> {
        let client = Client::try_from(config)
            .context("Failed to create Kubernetes client from config")?;

        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client,
            node_claim_resource: node_claim_resource(),
        }
    }

    /// Get the underlying kube client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get node API
    pub fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }

    /// Get the cluster-scoped NodeClaim API
    pub fn node_claims(&self) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), &self.node_claim_resource)
    }

    pub fn node_claim_resource(&self) -> &ApiResource {
        &self.node_claim_resource
    }

    /// Check that the API server is reachable and serves NodeClaims
    pub async fn health_check(&self) -> Result<()> {
        let _ = self
            .nodes()
            .list(&ListParams::default().limit(1))
            .await
            .context("Failed to list nodes")?;
        let _ = self
            .node_claims()
            .list(&ListParams::default().limit(1))
            .await
            .context("Failed to list nodeclaims")?;
        Ok(())
    }
}
