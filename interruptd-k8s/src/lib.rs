//! interruptd Kubernetes integration
//!
//! Provides the Kubernetes client, NodeClaim and Node access, and Event
//! publishing for the interruption controller.

pub mod client;
pub mod cluster;
pub mod recorder;

pub use client::K8sClient;
pub use cluster::KubeClusterState;
pub use recorder::KubeEventRecorder;
