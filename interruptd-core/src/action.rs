//! Action policy
//!
//! Maps a message kind to the remediation it requires.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::messages::{Kind, Message};

/// Remediation decided for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Delete the NodeClaim so the node is cordoned, drained and replaced
    CordonAndDrain,
    /// Notify only
    NoAction,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CordonAndDrain => "CordonAndDrain",
            Action::NoAction => "NoAction",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action required for a message kind
pub fn action_for_kind(kind: Kind) -> Action {
    match kind {
        Kind::ScheduledChange | Kind::SpotInterruption | Kind::StateChange => {
            Action::CordonAndDrain
        }
        Kind::RebalanceRecommendation | Kind::NoOp => Action::NoAction,
    }
}

/// Action required for a message
pub fn action_for(msg: &Message) -> Action {
    action_for_kind(msg.kind())
}
