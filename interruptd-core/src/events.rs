//! Notification events published while handling interruptions

use serde::{Deserialize, Serialize};

use crate::model::{Node, NodeClaim};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// Object an event is attached to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvolvedObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl InvolvedObject {
    pub fn node_claim(claim: &NodeClaim) -> Self {
        Self {
            api_version: "karpenter.sh/v1beta1".to_string(),
            kind: "NodeClaim".to_string(),
            name: claim.metadata.name.clone(),
            uid: claim.metadata.uid.clone(),
        }
    }

    pub fn node(node: &Node) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Node".to_string(),
            name: node.metadata.name.clone(),
            uid: node.metadata.uid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub involved_object: InvolvedObject,
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    /// Values identifying duplicates of this event
    pub dedupe_values: Vec<String>,
}

/// Sink for notification events. Publishing never blocks on delivery.
pub trait EventRecorder: Send + Sync {
    fn publish(&self, events: Vec<Event>);
}

/// Build the claim event, plus a node event when the node is known
fn for_claim_and_node(
    node: Option<&Node>,
    claim: &NodeClaim,
    event_type: EventType,
    reason: &str,
    claim_message: &str,
    node_message: &str,
) -> Vec<Event> {
    let mut events = vec![Event {
        involved_object: InvolvedObject::node_claim(claim),
        event_type,
        reason: reason.to_string(),
        message: claim_message.to_string(),
        dedupe_values: vec![claim.metadata.uid.clone()],
    }];
    if let Some(node) = node {
        events.push(Event {
            involved_object: InvolvedObject::node(node),
            event_type,
            reason: reason.to_string(),
            message: node_message.to_string(),
            dedupe_values: vec![node.metadata.uid.clone()],
        });
    }
    events
}

pub fn spot_interrupted(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Warning,
        "SpotInterrupted",
        "Spot interruption warning was triggered",
        "Spot interruption warning was triggered",
    )
}

pub fn rebalance_recommendation(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Normal,
        "RebalanceRecommendation",
        "Rebalance recommendation was triggered",
        "Rebalance recommendation was triggered",
    )
}

pub fn stopping(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Warning,
        "InstanceStopping",
        "Instance is stopping",
        "Instance is stopping",
    )
}

pub fn terminating(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Warning,
        "InstanceTerminating",
        "Instance is terminating",
        "Instance is terminating",
    )
}

pub fn unhealthy(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Warning,
        "Unhealthy",
        "An unhealthy warning was triggered",
        "An unhealthy warning was triggered",
    )
}

pub fn terminating_on_interruption(node: Option<&Node>, claim: &NodeClaim) -> Vec<Event> {
    for_claim_and_node(
        node,
        claim,
        EventType::Warning,
        "TerminatingOnInterruption",
        "Interruption triggered termination for the NodeClaim",
        "Interruption triggered termination for the Node",
    )
}
