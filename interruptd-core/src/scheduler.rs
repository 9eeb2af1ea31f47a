//! Reconciliation scheduler
//!
//! Drives the interruption controller on a fixed interval. A cycle that
//! received messages is followed immediately by another one, so a backlog
//! drains without waiting for the next tick.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::controller::{InterruptionController, InterruptionError, ReconcileSummary};

/// Reconciliation scheduler
pub struct InterruptionScheduler {
    controller: Arc<InterruptionController>,
    interval: Duration,
}

impl InterruptionScheduler {
    pub fn new(controller: Arc<InterruptionController>, interval: Duration) -> Self {
        Self {
            controller,
            interval,
        }
    }

    /// Run until `shutdown` flips to `true`
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            controller = self.controller.name(),
            interval = ?self.interval,
            "Starting interruption scheduler"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    // Keep going while the queue has traffic
                    while let Ok(summary) = self.run_once(&shutdown).await {
                        if summary.received == 0 || *shutdown.borrow() {
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Shutdown signal received, stopping scheduler");
    }

    /// Run a single reconciliation cycle and log its outcome
    pub async fn run_once(
        &self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<ReconcileSummary, InterruptionError> {
        let start = Instant::now();
        let result = self.controller.reconcile(shutdown).await;

        match &result {
            Ok(summary) if summary.received > 0 => info!(
                received = summary.received,
                deleted = summary.deleted,
                parse_failures = summary.parse_failures,
                duration = ?start.elapsed(),
                "Reconciled interruption messages"
            ),
            Ok(_) => debug!("Interruption queue empty"),
            Err(InterruptionError::Cancelled) => info!("Reconciliation cancelled"),
            Err(e) => error!(error = %e, "Interruption reconciliation failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::UnavailableOfferings;
    use crate::controller::ControllerConfig;
    use crate::fake::{self, FakeClusterState, FakeQueue, FakeRecorder};
    use crate::metrics::MetricsRegistry;

    fn scheduler(queue: Arc<FakeQueue>, cluster: Arc<FakeClusterState>) -> InterruptionScheduler {
        let controller = InterruptionController::new(
            queue,
            cluster,
            Arc::new(FakeRecorder::new()),
            Arc::new(UnavailableOfferings::new()),
            Arc::new(MetricsRegistry::unregistered()),
            ControllerConfig::default(),
        );
        InterruptionScheduler::new(Arc::new(controller), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_run_once() {
        let queue = Arc::new(FakeQueue::new());
        queue.push("m1", Some(&fake::rebalance_recommendation_body("i-123")));
        let scheduler = scheduler(queue.clone(), Arc::new(FakeClusterState::new()));
        let (_tx, rx) = watch::channel(false);

        let summary = scheduler.run_once(&rx).await.unwrap();
        assert_eq!(summary.received, 1);
        assert!(queue.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_run_once_reports_errors() {
        let queue = Arc::new(FakeQueue::new());
        queue.set_fail_receive(true);
        let scheduler = scheduler(queue, Arc::new(FakeClusterState::new()));
        let (_tx, rx) = watch::channel(false);

        assert!(scheduler.run_once(&rx).await.is_err());
    }

    #[tokio::test]
    async fn test_run_drains_queue_and_stops_on_shutdown() {
        let queue = Arc::new(FakeQueue::new());
        for i in 0..5 {
            queue.push(&format!("m{}", i), Some("not json"));
        }
        let scheduler = scheduler(queue.clone(), Arc::new(FakeClusterState::new()));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("scheduler stopped")
            .unwrap();
        assert!(queue.pending_ids().is_empty());
    }

    #[tokio::test]
    async fn test_run_keeps_going_after_errors() {
        let queue = Arc::new(FakeQueue::new());
        let cluster = Arc::new(FakeClusterState::new());
        queue.push("m1", Some(&fake::spot_interruption_body("i-123")));
        cluster.set_fail_list(true);
        let scheduler = scheduler(queue.clone(), cluster.clone());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.pending_ids(), vec!["m1"]);

        cluster.set_fail_list(false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(queue.pending_ids().is_empty());
    }
}
