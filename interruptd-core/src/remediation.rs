//! Remediation executor
//!
//! Applies the decided action for one message against one NodeClaim:
//! notify, mark spot capacity unavailable, pre-provision a replacement and
//! delete the interrupted claim.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::action::{action_for, Action};
use crate::cache::UnavailableOfferings;
use crate::cluster::{ClusterError, ClusterState};
use crate::events::{self, EventRecorder};
use crate::messages::{Kind, Message};
use crate::metrics::{MetricsRegistry, TERMINATION_REASON_INTERRUPTION};
use crate::model::{
    Node, NodeClaim, CAPACITY_TYPE_SPOT, LABEL_CAPACITY_TYPE, LABEL_INSTANCE_TYPE, LABEL_NODEPOOL,
    LABEL_TOPOLOGY_ZONE,
};

/// Failure to remediate; the message must be redelivered
#[derive(Debug, Error)]
pub enum RemediationError {
    #[error("deleting nodeclaim {nodeclaim} on interruption message: {source}")]
    Delete {
        nodeclaim: String,
        #[source]
        source: ClusterError,
    },
}

/// Executes remediation for correlated NodeClaims
pub struct Remediator {
    cluster: Arc<dyn ClusterState>,
    recorder: Arc<dyn EventRecorder>,
    unavailable_offerings: Arc<UnavailableOfferings>,
    metrics: Arc<MetricsRegistry>,
    dry_run: bool,
}

impl Remediator {
    pub fn new(
        cluster: Arc<dyn ClusterState>,
        recorder: Arc<dyn EventRecorder>,
        unavailable_offerings: Arc<UnavailableOfferings>,
        metrics: Arc<MetricsRegistry>,
        dry_run: bool,
    ) -> Self {
        Self {
            cluster,
            recorder,
            unavailable_offerings,
            metrics,
            dry_run,
        }
    }

    /// Handle one message for one NodeClaim and its Node, if registered
    pub async fn handle(
        &self,
        msg: &Message,
        claim: &NodeClaim,
        node: Option<&Node>,
    ) -> Result<Action, RemediationError> {
        let action = action_for(msg);
        debug!(
            kind = %msg.kind(),
            nodeclaim = claim.name(),
            node = node.map(Node::name),
            action = %action,
            "Handling interruption for nodeclaim"
        );

        self.notify(msg, claim, node);
        self.metrics.inc_action_performed(action);

        if msg.kind() == Kind::SpotInterruption {
            self.mark_spot_unavailable(msg.kind(), claim);
            self.create_replacement(claim).await;
        }

        if action == Action::CordonAndDrain {
            self.delete_node_claim(claim, node).await?;
        }
        Ok(action)
    }

    /// Publish the kind-specific notification
    fn notify(&self, msg: &Message, claim: &NodeClaim, node: Option<&Node>) {
        let published = match msg {
            Message::RebalanceRecommendation(_) => events::rebalance_recommendation(node, claim),
            Message::ScheduledChange(_) => events::unhealthy(node, claim),
            Message::SpotInterruption(_) => events::spot_interrupted(node, claim),
            Message::StateChange(change) if change.is_stopping() => events::stopping(node, claim),
            Message::StateChange(_) => events::terminating(node, claim),
            Message::NoOp(_) => return,
        };
        self.recorder.publish(published);
    }

    fn mark_spot_unavailable(&self, kind: Kind, claim: &NodeClaim) {
        let zone = claim.metadata.label(LABEL_TOPOLOGY_ZONE);
        let instance_type = claim.metadata.label(LABEL_INSTANCE_TYPE);
        if let (Some(zone), Some(instance_type)) = (zone, instance_type) {
            self.unavailable_offerings.mark_unavailable(
                kind.as_str(),
                instance_type,
                zone,
                CAPACITY_TYPE_SPOT,
            );
        }
    }

    /// Start provisioning a replacement before the drain finishes.
    /// Failures are swallowed: regular provisioning recreates the capacity.
    async fn create_replacement(&self, claim: &NodeClaim) {
        let replacement = claim.replacement();
        if self.dry_run {
            info!(
                nodeclaim = claim.name(),
                "[DRY-RUN] Would create replacement nodeclaim"
            );
            return;
        }

        match self.cluster.create_node_claim(&replacement).await {
            Ok(created) => info!(
                nodeclaim = claim.name(),
                replacement = created.name(),
                "Created replacement nodeclaim"
            ),
            Err(e) => error!(
                nodeclaim = claim.name(),
                error = %e,
                "Failed to create a replacement nodeclaim"
            ),
        }
    }

    async fn delete_node_claim(
        &self,
        claim: &NodeClaim,
        node: Option<&Node>,
    ) -> Result<(), RemediationError> {
        if claim.is_deleting() {
            debug!(nodeclaim = claim.name(), "NodeClaim already deleting");
            return Ok(());
        }
        if self.dry_run {
            info!(nodeclaim = claim.name(), "[DRY-RUN] Would delete nodeclaim");
            return Ok(());
        }

        match self.cluster.delete_node_claim(claim).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                debug!(nodeclaim = claim.name(), "NodeClaim already deleted");
                return Ok(());
            }
            Err(source) => {
                return Err(RemediationError::Delete {
                    nodeclaim: claim.name().to_string(),
                    source,
                })
            }
        }

        info!(
            nodeclaim = claim.name(),
            node = node.map(Node::name),
            "Initiating delete from interruption message"
        );
        self.recorder
            .publish(events::terminating_on_interruption(node, claim));
        self.metrics.inc_nodeclaim_terminated(
            TERMINATION_REASON_INTERRUPTION,
            claim.metadata.label(LABEL_NODEPOOL).unwrap_or_default(),
            claim.metadata.label(LABEL_CAPACITY_TYPE).unwrap_or_default(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{self, node, node_claim, FakeClusterState, FakeRecorder};
    use crate::messages::EventParser;
    use chrono::Utc;
    use tokio_test::{assert_err, assert_ok};

    struct Harness {
        cluster: Arc<FakeClusterState>,
        recorder: Arc<FakeRecorder>,
        cache: Arc<UnavailableOfferings>,
        metrics: Arc<MetricsRegistry>,
        remediator: Remediator,
    }

    fn harness(dry_run: bool) -> Harness {
        let cluster = Arc::new(FakeClusterState::new());
        let recorder = Arc::new(FakeRecorder::new());
        let cache = Arc::new(UnavailableOfferings::new());
        let metrics = Arc::new(MetricsRegistry::unregistered());
        let remediator = Remediator::new(
            cluster.clone(),
            recorder.clone(),
            cache.clone(),
            metrics.clone(),
            dry_run,
        );
        Harness {
            cluster,
            recorder,
            cache,
            metrics,
            remediator,
        }
    }

    fn spot_claim() -> NodeClaim {
        let mut claim = node_claim("default-x1", "aws:///us-east-1a/i-123");
        for (k, v) in [
            (LABEL_TOPOLOGY_ZONE, "us-east-1a"),
            (LABEL_INSTANCE_TYPE, "m5.large"),
            (LABEL_CAPACITY_TYPE, "spot"),
            (LABEL_NODEPOOL, "default"),
        ] {
            claim.metadata.labels.insert(k.to_string(), v.to_string());
        }
        claim
    }

    fn parse(body: &str) -> Message {
        EventParser::default().parse(body).unwrap()
    }

    fn terminated(h: &Harness) -> u64 {
        h.metrics
            .nodeclaims_terminated(TERMINATION_REASON_INTERRUPTION, "default", "spot")
    }

    #[tokio::test]
    async fn test_spot_interruption_happy_path() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let msg = parse(&fake::spot_interruption_body("i-123"));

        let action = h.remediator.handle(&msg, &claim, None).await.unwrap();

        assert_eq!(action, Action::CordonAndDrain);
        assert!(h.cache.is_unavailable("m5.large", "us-east-1a", "spot"));
        assert_eq!(h.cluster.created().len(), 1);
        assert_eq!(h.cluster.deleted(), vec!["default-x1"]);
        assert_eq!(terminated(&h), 1);
        assert_eq!(h.metrics.actions_performed(Action::CordonAndDrain), 1);
        assert_eq!(
            h.recorder.reasons(),
            vec!["SpotInterrupted", "TerminatingOnInterruption"]
        );

        let replacement = &h.cluster.created()[0];
        assert_ne!(replacement.name(), claim.name());
        assert!(!replacement.is_deleting());
        assert_eq!(replacement.metadata.labels, claim.metadata.labels);
        assert_eq!(replacement.spec, claim.spec);
    }

    #[tokio::test]
    async fn test_spot_without_zone_label_skips_cache() {
        let h = harness(false);
        let mut claim = spot_claim();
        claim.metadata.labels.remove(LABEL_TOPOLOGY_ZONE);
        h.cluster.add_node_claim(claim.clone());

        let msg = parse(&fake::spot_interruption_body("i-123"));
        assert_ok!(h.remediator.handle(&msg, &claim, None).await);

        assert!(h.cache.is_empty());
        assert_eq!(h.cache.seq_num(), 0);
        assert_eq!(h.cluster.create_calls(), 1);
    }

    #[tokio::test]
    async fn test_replacement_failure_is_swallowed() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        h.cluster.set_fail_create(true);

        let msg = parse(&fake::spot_interruption_body("i-123"));
        assert_ok!(h.remediator.handle(&msg, &claim, None).await);

        assert_eq!(h.cluster.create_calls(), 1);
        assert_eq!(h.cluster.deleted(), vec!["default-x1"]);
    }

    #[tokio::test]
    async fn test_already_deleting_is_noop() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let msg = parse(&fake::state_change_body("i-123", "terminated"));

        assert_ok!(h.remediator.handle(&msg, &claim, None).await);
        assert_eq!(terminated(&h), 1);

        // Second delivery sees the deletion marker set
        let mut deleting = claim.clone();
        deleting.metadata.deletion_timestamp = Some(Utc::now());
        assert_ok!(h.remediator.handle(&msg, &deleting, None).await);

        assert_eq!(h.cluster.delete_calls(), 1);
        assert_eq!(terminated(&h), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_success() {
        let h = harness(false);
        let claim = spot_claim();
        // Never added to the cluster, so the delete reports not found
        let msg = parse(&fake::scheduled_change_body("i-123"));

        assert_ok!(h.remediator.handle(&msg, &claim, None).await);
        assert_eq!(h.cluster.delete_calls(), 1);
        assert_eq!(terminated(&h), 0);
        assert_eq!(h.recorder.reasons(), vec!["Unhealthy"]);
    }

    #[tokio::test]
    async fn test_delete_failure_propagates() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        h.cluster.set_fail_delete(true);
        let msg = parse(&fake::state_change_body("i-123", "shutting-down"));

        let err = assert_err!(h.remediator.handle(&msg, &claim, None).await);
        assert!(err.to_string().contains("default-x1"));
        assert_eq!(terminated(&h), 0);
    }

    #[tokio::test]
    async fn test_state_change_stopping_event() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let n = node("ip-10-0-0-1", "aws:///us-east-1a/i-123");
        let msg = parse(&fake::state_change_body("i-123", "stopping"));

        let action = h.remediator.handle(&msg, &claim, Some(&n)).await.unwrap();

        assert_eq!(action, Action::CordonAndDrain);
        assert_eq!(h.cluster.deleted(), vec!["default-x1"]);
        assert_eq!(
            h.recorder.reasons(),
            vec![
                "InstanceStopping",
                "InstanceStopping",
                "TerminatingOnInterruption",
                "TerminatingOnInterruption"
            ]
        );
        // Not a spot interruption: no cache mark, no replacement
        assert!(h.cache.is_empty());
        assert_eq!(h.cluster.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_state_change_terminated_event() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let msg = parse(&fake::state_change_body("i-123", "terminated"));

        assert_ok!(h.remediator.handle(&msg, &claim, None).await);
        assert_eq!(h.recorder.reasons()[0], "InstanceTerminating");
    }

    #[tokio::test]
    async fn test_rebalance_takes_no_action() {
        let h = harness(false);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let msg = parse(&fake::rebalance_recommendation_body("i-123"));

        let action = h.remediator.handle(&msg, &claim, None).await.unwrap();

        assert_eq!(action, Action::NoAction);
        assert_eq!(h.cluster.delete_calls(), 0);
        assert_eq!(h.cluster.create_calls(), 0);
        assert_eq!(h.recorder.reasons(), vec!["RebalanceRecommendation"]);
        assert_eq!(h.metrics.actions_performed(Action::NoAction), 1);
    }

    #[tokio::test]
    async fn test_dry_run_skips_mutations() {
        let h = harness(true);
        let claim = spot_claim();
        h.cluster.add_node_claim(claim.clone());
        let msg = parse(&fake::spot_interruption_body("i-123"));

        assert_ok!(h.remediator.handle(&msg, &claim, None).await);

        assert_eq!(h.cluster.create_calls(), 0);
        assert_eq!(h.cluster.delete_calls(), 0);
        assert!(h.cache.is_unavailable("m5.large", "us-east-1a", "spot"));
        assert_eq!(h.recorder.reasons(), vec!["SpotInterrupted"]);
    }
}
