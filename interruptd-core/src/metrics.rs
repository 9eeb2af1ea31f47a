//! Prometheus metrics for interruption handling

use prometheus::{
    exponential_buckets, histogram_opts, opts, Histogram, IntCounter, IntCounterVec, Registry,
};

use crate::action::Action;
use crate::messages::Kind;

/// Reason label for NodeClaims terminated by this controller
pub const TERMINATION_REASON_INTERRUPTION: &str = "interruption";

/// Metrics registry wrapper
#[derive(Clone)]
pub struct MetricsRegistry {
    messages_received: IntCounterVec,
    messages_deleted: IntCounter,
    actions_performed: IntCounterVec,
    nodeclaims_terminated: IntCounterVec,
    message_latency: Histogram,
}

impl MetricsRegistry {
    /// Create the collectors and register them in `registry`
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let messages_received = IntCounterVec::new(
            opts!(
                "interruptd_messages_received_total",
                "Number of interruption messages received, by message kind"
            ),
            &["kind"],
        )?;
        let messages_deleted = IntCounter::with_opts(opts!(
            "interruptd_messages_deleted_total",
            "Number of interruption messages deleted from the queue"
        ))?;
        let actions_performed = IntCounterVec::new(
            opts!(
                "interruptd_actions_performed_total",
                "Number of remediation actions performed, by action"
            ),
            &["action"],
        )?;
        let nodeclaims_terminated = IntCounterVec::new(
            opts!(
                "interruptd_nodeclaims_terminated_total",
                "Number of NodeClaims terminated"
            ),
            &["reason", "nodepool", "capacity_type"],
        )?;
        let message_latency = Histogram::with_opts(histogram_opts!(
            "interruptd_message_latency_seconds",
            "Time from event origin until the message was handled",
            exponential_buckets(0.5, 2.0, 12)?
        ))?;

        registry.register(Box::new(messages_received.clone()))?;
        registry.register(Box::new(messages_deleted.clone()))?;
        registry.register(Box::new(actions_performed.clone()))?;
        registry.register(Box::new(nodeclaims_terminated.clone()))?;
        registry.register(Box::new(message_latency.clone()))?;

        Ok(Self {
            messages_received,
            messages_deleted,
            actions_performed,
            nodeclaims_terminated,
            message_latency,
        })
    }

    /// Collectors registered in a private registry, for tests and embedding
    pub fn unregistered() -> Self {
        Self::new(&Registry::new()).expect("fresh registry accepts collectors")
    }

    pub fn inc_message_received(&self, kind: Kind) {
        self.messages_received
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    pub fn inc_message_deleted(&self) {
        self.messages_deleted.inc();
    }

    pub fn inc_action_performed(&self, action: Action) {
        self.actions_performed
            .with_label_values(&[action.as_str()])
            .inc();
    }

    pub fn inc_nodeclaim_terminated(&self, reason: &str, nodepool: &str, capacity_type: &str) {
        self.nodeclaims_terminated
            .with_label_values(&[reason, nodepool, capacity_type])
            .inc();
    }

    pub fn observe_message_latency(&self, seconds: f64) {
        self.message_latency.observe(seconds);
    }

    pub fn messages_received(&self, kind: Kind) -> u64 {
        self.messages_received
            .with_label_values(&[kind.as_str()])
            .get()
    }

    pub fn messages_deleted(&self) -> u64 {
        self.messages_deleted.get()
    }

    pub fn actions_performed(&self, action: Action) -> u64 {
        self.actions_performed
            .with_label_values(&[action.as_str()])
            .get()
    }

    pub fn nodeclaims_terminated(&self, reason: &str, nodepool: &str, capacity_type: &str) -> u64 {
        self.nodeclaims_terminated
            .with_label_values(&[reason, nodepool, capacity_type])
            .get()
    }

    pub fn message_latency_count(&self) -> u64 {
        self.message_latency.get_sample_count()
    }
}
