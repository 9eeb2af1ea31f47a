//! Interruption controller
//!
//! One reconciliation cycle:
//! 1. Receive a batch from the interruption queue
//! 2. Index NodeClaims and Nodes by instance id
//! 3. Parse, remediate and acknowledge each message, at most
//!    `max_concurrent_messages` at a time
//! 4. Combine remediation failures into the cycle's error
//!
//! Messages whose remediation failed are left on the queue so they are
//! redelivered after the visibility timeout.

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, trace, warn};

use crate::cache::UnavailableOfferings;
use crate::cluster::{ClusterError, ClusterState};
use crate::correlation::CorrelationIndex;
use crate::events::EventRecorder;
use crate::messages::{EventParser, Kind, Message, ParseError};
use crate::metrics::MetricsRegistry;
use crate::queue::{QueueError, QueueProvider, RawQueueMessage};
use crate::remediation::{RemediationError, Remediator};

/// Default bound on messages handled at once
pub const DEFAULT_MAX_CONCURRENT_MESSAGES: usize = 10;

/// Errors surfaced by a reconciliation cycle
#[derive(Debug, Error)]
pub enum InterruptionError {
    /// Receiving the batch failed
    #[error("getting messages from queue: {0}")]
    Queue(#[source] QueueError),

    /// Listing cluster state failed, no message was touched
    #[error("building instance correlation index: {0}")]
    Listing(#[source] ClusterError),

    /// Remediation failed for one or more NodeClaims of a message
    #[error("handling message {message_id}: {}", join(.errors))]
    Remediation {
        message_id: String,
        errors: Vec<RemediationError>,
    },

    /// Acknowledging a message failed
    #[error("deleting message: {0}")]
    DeleteMessage(#[source] QueueError),

    /// The cycle was cancelled before the handler completed
    #[error("reconciliation cancelled")]
    Cancelled,

    /// Several messages failed
    #[error("{} messages failed: {}", .0.len(), join(.0))]
    Aggregate(Vec<InterruptionError>),
}

impl InterruptionError {
    /// Individual failures, flattening an aggregate
    pub fn failures(&self) -> Vec<&InterruptionError> {
        match self {
            InterruptionError::Aggregate(errors) => errors.iter().collect(),
            other => vec![other],
        }
    }

    fn combine(mut errors: Vec<InterruptionError>) -> Option<InterruptionError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(InterruptionError::Aggregate(errors)),
        }
    }
}

fn join<E: fmt::Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Counts for a successful cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Messages in the batch
    pub received: usize,
    /// Messages acknowledged
    pub deleted: usize,
    /// Messages dropped because they could not be parsed
    pub parse_failures: usize,
    /// Parsed messages fully handled
    pub handled: usize,
}

/// Result of handling one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Handled,
    ParseFailure,
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Upper bound on messages handled concurrently
    pub max_concurrent_messages: usize,
    /// Log mutations instead of applying them
    pub dry_run: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_messages: DEFAULT_MAX_CONCURRENT_MESSAGES,
            dry_run: false,
        }
    }
}

/// Polls the interruption queue and remediates affected NodeClaims
pub struct InterruptionController {
    queue: Arc<dyn QueueProvider>,
    cluster: Arc<dyn ClusterState>,
    parser: EventParser,
    remediator: Remediator,
    metrics: Arc<MetricsRegistry>,
    max_concurrent_messages: usize,
    watched_queue: Mutex<Option<String>>,
}

impl InterruptionController {
    pub fn new(
        queue: Arc<dyn QueueProvider>,
        cluster: Arc<dyn ClusterState>,
        recorder: Arc<dyn EventRecorder>,
        unavailable_offerings: Arc<UnavailableOfferings>,
        metrics: Arc<MetricsRegistry>,
        config: ControllerConfig,
    ) -> Self {
        let remediator = Remediator::new(
            cluster.clone(),
            recorder,
            unavailable_offerings,
            metrics.clone(),
            config.dry_run,
        );
        Self {
            queue,
            cluster,
            parser: EventParser::default(),
            remediator,
            metrics,
            max_concurrent_messages: config.max_concurrent_messages.max(1),
            watched_queue: Mutex::new(None),
        }
    }

    /// Replace the default event parser
    pub fn with_parser(mut self, parser: EventParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn name(&self) -> &'static str {
        "interruption"
    }

    /// Run one reconciliation cycle. `cancel` flipping to `true` aborts
    /// in-flight handlers without acknowledging their messages.
    pub async fn reconcile(
        &self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<ReconcileSummary, InterruptionError> {
        self.log_queue_change();
        if *cancel.borrow() {
            return Err(InterruptionError::Cancelled);
        }

        let messages = self
            .queue
            .receive()
            .await
            .map_err(InterruptionError::Queue)?;
        if messages.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let index = CorrelationIndex::build(self.cluster.as_ref())
            .await
            .map_err(InterruptionError::Listing)?;
        debug!(
            queue = self.queue.name(),
            messages = messages.len(),
            nodeclaims = index.node_claim_count(),
            nodes = index.node_count(),
            "Processing interruption messages"
        );

        // Built eagerly: a borrowing map closure inside the stream is not Send
        let handlers: Vec<_> = messages
            .iter()
            .map(|raw| self.process_cancellable(raw, &index, cancel.clone()))
            .collect();
        let results: Vec<_> = stream::iter(handlers)
            .buffer_unordered(self.max_concurrent_messages)
            .collect()
            .await;

        let mut summary = ReconcileSummary {
            received: messages.len(),
            ..Default::default()
        };
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(Outcome::Handled) => {
                    summary.handled += 1;
                    summary.deleted += 1;
                }
                Ok(Outcome::ParseFailure) => {
                    summary.parse_failures += 1;
                    summary.deleted += 1;
                }
                Err(e) => errors.push(e),
            }
        }

        match InterruptionError::combine(errors) {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    fn log_queue_change(&self) {
        let name = self.queue.name();
        if let Ok(mut watched) = self.watched_queue.lock() {
            if watched.as_deref() != Some(name) {
                debug!(queue = name, "Watching interruption queue");
                *watched = Some(name.to_string());
            }
        }
    }

    async fn process_cancellable(
        &self,
        raw: &RawQueueMessage,
        index: &CorrelationIndex,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Outcome, InterruptionError> {
        if *cancel.borrow_and_update() {
            return Err(InterruptionError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => {
                warn!(message_id = %raw.id, "Message handling cancelled");
                Err(InterruptionError::Cancelled)
            }
            result = self.process(raw, index) => result,
        }
    }

    /// Handle one delivery end to end
    async fn process(
        &self,
        raw: &RawQueueMessage,
        index: &CorrelationIndex,
    ) -> Result<Outcome, InterruptionError> {
        let msg = match self.parse(raw) {
            Ok(msg) => msg,
            Err(e) => {
                // Unparseable messages never become parseable, drop them
                error!(
                    queue = self.queue.name(),
                    message_id = %raw.id,
                    error = %e,
                    "Failed to parse message"
                );
                self.delete_message(raw).await?;
                return Ok(Outcome::ParseFailure);
            }
        };

        let kind = msg.kind();
        self.metrics.inc_message_received(kind);

        if kind != Kind::NoOp {
            let errors = self.handle_message(&msg, index).await;
            if !errors.is_empty() {
                return Err(InterruptionError::Remediation {
                    message_id: raw.id.clone(),
                    errors,
                });
            }
        }

        self.delete_message(raw).await?;
        if kind != Kind::NoOp {
            self.observe_latency(&msg);
        }
        Ok(Outcome::Handled)
    }

    fn parse(&self, raw: &RawQueueMessage) -> Result<Message, ParseError> {
        let body = raw.body.as_deref().ok_or(ParseError::EmptyBody)?;
        self.parser.parse(body)
    }

    /// Remediate every tracked instance of the message
    async fn handle_message(
        &self,
        msg: &Message,
        index: &CorrelationIndex,
    ) -> Vec<RemediationError> {
        let mut errors = Vec::new();
        for instance_id in msg.ec2_instance_ids() {
            let Some(claim) = index.node_claim(&instance_id) else {
                trace!(
                    kind = %msg.kind(),
                    instance_id = %instance_id,
                    "No nodeclaim for instance"
                );
                continue;
            };
            let node = index.node(&instance_id);
            if let Err(e) = self.remediator.handle(msg, claim, node).await {
                errors.push(e);
            }
        }
        errors
    }

    async fn delete_message(&self, raw: &RawQueueMessage) -> Result<(), InterruptionError> {
        self.queue
            .delete(raw)
            .await
            .map_err(InterruptionError::DeleteMessage)?;
        self.metrics.inc_message_deleted();
        Ok(())
    }

    fn observe_latency(&self, msg: &Message) {
        if let Some(start) = msg.start_time() {
            let elapsed = (Utc::now() - start).to_std().unwrap_or_default();
            self.metrics.observe_message_latency(elapsed.as_secs_f64());
        }
    }
}

/// Resolves once the signal is `true`. A dropped sender never cancels.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
