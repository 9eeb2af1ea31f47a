//! Cluster records seen by the interruption pipeline
//!
//! These mirror the Kubernetes JSON shape of NodeClaims and Nodes closely
//! enough that backends can convert with serde, but carry only what the
//! pipeline reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::provider_id::parse_instance_id;

pub const LABEL_TOPOLOGY_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";
pub const LABEL_NODEPOOL: &str = "karpenter.sh/nodepool";

pub const CAPACITY_TYPE_SPOT: &str = "spot";
pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_owner_deletion: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Set once when deletion starts, never cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeClaimStatus {
    #[serde(default, rename = "providerID", skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub node_name: String,
}

/// A requested or provisioned compute node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeClaim {
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Opaque to interruption handling, copied verbatim to replacements
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: NodeClaimStatus,
}

impl NodeClaim {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Instance backing this claim, if it has launched
    pub fn instance_id(&self) -> Option<String> {
        if self.status.provider_id.is_empty() {
            return None;
        }
        parse_instance_id(&self.status.provider_id)
            .ok()
            .filter(|id| !id.is_empty())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// A fresh claim with the same shape as this one.
    ///
    /// Keeps generate-name, annotations, labels, owner references and spec;
    /// drops name, uid, deletion marker and status.
    pub fn replacement(&self) -> NodeClaim {
        NodeClaim {
            metadata: ObjectMeta {
                generate_name: self.metadata.generate_name.clone(),
                annotations: self.metadata.annotations.clone(),
                labels: self.metadata.labels.clone(),
                owner_references: self.metadata.owner_references.clone(),
                ..Default::default()
            },
            spec: self.spec.clone(),
            status: NodeClaimStatus::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    #[serde(default, rename = "providerID", skip_serializing_if = "String::is_empty")]
    pub provider_id: String,
    #[serde(default)]
    pub unschedulable: bool,
}

/// A registered kubelet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: NodeSpec,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn instance_id(&self) -> Option<String> {
        if self.spec.provider_id.is_empty() {
            return None;
        }
        parse_instance_id(&self.spec.provider_id)
            .ok()
            .filter(|id| !id.is_empty())
    }
}
