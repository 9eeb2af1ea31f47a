//! interruptd core library
//!
//! Turns cloud interruption events into NodeClaim remediation.
//! This crate provides the message model and parser, instance correlation,
//! the remediation executor and the reconciliation controller.

pub mod action;
pub mod cache;
pub mod cluster;
pub mod controller;
pub mod correlation;
pub mod events;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod messages;
pub mod metrics;
pub mod model;
pub mod provider_id;
pub mod queue;
pub mod remediation;
pub mod scheduler;

// Re-export common types
pub use action::{action_for, Action};
pub use cache::UnavailableOfferings;
pub use cluster::{ClusterError, ClusterState};
pub use controller::{ControllerConfig, InterruptionController, InterruptionError, ReconcileSummary};
pub use events::{Event, EventRecorder};
pub use messages::{EventParser, Kind, Message, ParseError};
pub use metrics::MetricsRegistry;
pub use model::{Node, NodeClaim};
pub use queue::{QueueError, QueueProvider, RawQueueMessage};
pub use remediation::{RemediationError, Remediator};
pub use scheduler::InterruptionScheduler;
