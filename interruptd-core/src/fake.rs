//! In-memory collaborators for testing
//!
//! Compiled for this crate's tests and behind the `fake` feature.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::cluster::{ClusterError, ClusterState};
use crate::events::{Event, EventRecorder};
use crate::model::{Node, NodeClaim, NodeClaimStatus, NodeSpec, ObjectMeta};
use crate::queue::{QueueError, QueueProvider, RawQueueMessage};

/// Queue that redelivers every message until it is deleted
pub struct FakeQueue {
    name: String,
    pending: Mutex<Vec<RawQueueMessage>>,
    deleted: Mutex<Vec<String>>,
    /// Configurable receive failure simulation
    pub fail_receive: AtomicBool,
    /// Configurable delete failure simulation
    pub fail_delete: AtomicBool,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::named("fake-queue")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pending: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            fail_receive: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
        }
    }

    /// Enqueue a message with the given body
    pub fn push(&self, id: &str, body: Option<&str>) {
        self.pending
            .lock()
            .unwrap()
            .push(RawQueueMessage::new(id, body.map(str::to_string)));
    }

    pub fn set_fail_receive(&self, fail: bool) {
        self.fail_receive.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Ids of messages still waiting for acknowledgement
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.id.clone())
            .collect()
    }

    /// Ids of deleted messages, in deletion order
    pub fn deleted_ids(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl Default for FakeQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueProvider for FakeQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn receive(&self) -> Result<Vec<RawQueueMessage>, QueueError> {
        if self.fail_receive.load(Ordering::SeqCst) {
            return Err(QueueError::Receive {
                queue: self.name.clone(),
                reason: "simulated receive failure".to_string(),
            });
        }
        Ok(self.pending.lock().unwrap().clone())
    }

    async fn delete(&self, message: &RawQueueMessage) -> Result<(), QueueError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(QueueError::Delete {
                queue: self.name.clone(),
                id: message.id.clone(),
                reason: "simulated delete failure".to_string(),
            });
        }
        self.pending
            .lock()
            .unwrap()
            .retain(|m| m.receipt_handle != message.receipt_handle);
        self.deleted.lock().unwrap().push(message.id.clone());
        Ok(())
    }
}

/// Cluster state held in memory
pub struct FakeClusterState {
    node_claims: Mutex<BTreeMap<String, NodeClaim>>,
    nodes: Mutex<Vec<Node>>,
    created: Mutex<Vec<NodeClaim>>,
    deleted: Mutex<Vec<String>>,
    delete_delay: Mutex<Option<Duration>>,
    pub fail_list: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_create: AtomicBool,
    pub delete_calls: AtomicU32,
    pub create_calls: AtomicU32,
    generated: AtomicU32,
}

impl FakeClusterState {
    pub fn new() -> Self {
        Self {
            node_claims: Mutex::new(BTreeMap::new()),
            nodes: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            delete_delay: Mutex::new(None),
            fail_list: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            delete_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            generated: AtomicU32::new(0),
        }
    }

    pub fn add_node_claim(&self, claim: NodeClaim) {
        self.node_claims
            .lock()
            .unwrap()
            .insert(claim.metadata.name.clone(), claim);
    }

    pub fn add_node(&self, node: Node) {
        self.nodes.lock().unwrap().push(node);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every delete take this long before completing
    pub fn set_delete_delay(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    pub fn get_node_claim(&self, name: &str) -> Option<NodeClaim> {
        self.node_claims.lock().unwrap().get(name).cloned()
    }

    /// NodeClaims created through the API, in creation order
    pub fn created(&self) -> Vec<NodeClaim> {
        self.created.lock().unwrap().clone()
    }

    /// Names of NodeClaims deleted through the API
    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn delete_calls(&self) -> u32 {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }
}

impl Default for FakeClusterState {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterState for FakeClusterState {
    async fn list_node_claims(&self) -> Result<Vec<NodeClaim>, ClusterError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ClusterError::List {
                kind: "NodeClaim",
                reason: "simulated list failure".to_string(),
            });
        }
        Ok(self.node_claims.lock().unwrap().values().cloned().collect())
    }

    async fn list_nodes(&self) -> Result<Vec<Node>, ClusterError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(ClusterError::List {
                kind: "Node",
                reason: "simulated list failure".to_string(),
            });
        }
        Ok(self.nodes.lock().unwrap().clone())
    }

    async fn delete_node_claim(&self, claim: &NodeClaim) -> Result<(), ClusterError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ClusterError::Api {
                operation: "deleting",
                kind: "NodeClaim",
                name: claim.name().to_string(),
                reason: "simulated delete failure".to_string(),
            });
        }
        match self.node_claims.lock().unwrap().remove(claim.name()) {
            Some(_) => {
                self.deleted.lock().unwrap().push(claim.name().to_string());
                Ok(())
            }
            None => Err(ClusterError::NotFound {
                kind: "NodeClaim",
                name: claim.name().to_string(),
            }),
        }
    }

    async fn create_node_claim(&self, claim: &NodeClaim) -> Result<NodeClaim, ClusterError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ClusterError::Api {
                operation: "creating",
                kind: "NodeClaim",
                name: claim.metadata.generate_name.clone(),
                reason: "simulated create failure".to_string(),
            });
        }
        let mut created = claim.clone();
        if created.metadata.name.is_empty() {
            let n = self.generated.fetch_add(1, Ordering::SeqCst);
            created.metadata.name = format!("{}{:05}", claim.metadata.generate_name, n);
        }
        self.node_claims
            .lock()
            .unwrap()
            .insert(created.metadata.name.clone(), created.clone());
        self.created.lock().unwrap().push(created.clone());
        Ok(created)
    }
}

/// Recorder that keeps every published event
#[derive(Default)]
pub struct FakeRecorder {
    events: Mutex<Vec<Event>>,
}

impl FakeRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    /// Reasons of published events, in publish order
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }
}

impl EventRecorder for FakeRecorder {
    fn publish(&self, events: Vec<Event>) {
        self.events.lock().unwrap().extend(events);
    }
}

/// A NodeClaim bound to `provider_id`
pub fn node_claim(name: &str, provider_id: &str) -> NodeClaim {
    NodeClaim {
        metadata: ObjectMeta {
            name: name.to_string(),
            generate_name: "default-".to_string(),
            uid: format!("{}-uid", name),
            ..Default::default()
        },
        spec: serde_json::json!({"nodeClassRef": {"name": "default"}}),
        status: NodeClaimStatus {
            provider_id: provider_id.to_string(),
            node_name: String::new(),
        },
    }
}

/// A Node bound to `provider_id`
pub fn node(name: &str, provider_id: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: name.to_string(),
            uid: format!("{}-uid", name),
            ..Default::default()
        },
        spec: NodeSpec {
            provider_id: provider_id.to_string(),
            unschedulable: false,
        },
    }
}

fn envelope(source: &str, detail_type: &str, time: DateTime<Utc>, detail: serde_json::Value) -> String {
    serde_json::json!({
        "version": "0",
        "id": "00000000-0000-0000-0000-000000000000",
        "detail-type": detail_type,
        "source": source,
        "account": "123456789012",
        "time": time.to_rfc3339(),
        "region": "us-east-1",
        "resources": [],
        "detail": detail,
    })
    .to_string()
}

/// Queue body for a spot interruption warning
pub fn spot_interruption_body(instance_id: &str) -> String {
    envelope(
        "aws.ec2",
        "EC2 Spot Instance Interruption Warning",
        Utc::now(),
        serde_json::json!({"instance-id": instance_id, "instance-action": "terminate"}),
    )
}

/// Queue body for a rebalance recommendation
pub fn rebalance_recommendation_body(instance_id: &str) -> String {
    envelope(
        "aws.ec2",
        "EC2 Instance Rebalance Recommendation",
        Utc::now(),
        serde_json::json!({"instance-id": instance_id}),
    )
}

/// Queue body for an instance state change
pub fn state_change_body(instance_id: &str, state: &str) -> String {
    envelope(
        "aws.ec2",
        "EC2 Instance State-change Notification",
        Utc::now(),
        serde_json::json!({"instance-id": instance_id, "state": state}),
    )
}

/// Queue body for an EC2 scheduled maintenance health event
pub fn scheduled_change_body(instance_id: &str) -> String {
    envelope(
        "aws.health",
        "AWS Health Event",
        Utc::now(),
        serde_json::json!({
            "service": "EC2",
            "eventTypeCategory": "scheduledChange",
            "eventTypeCode": "AWS_EC2_MAINTENANCE_SCHEDULED",
            "affectedEntities": [{"entityValue": instance_id}],
        }),
    )
}
