//! Interruption messages
//!
//! Typed model of the infrastructure events delivered on the interruption queue:
//! - Scheduled change: health-event maintenance notice
//! - Spot interruption: two minute reclamation warning
//! - Rebalance recommendation: advisory, no mandatory action
//! - State change: instance moved to a stopping/terminating state
//! - No-op: parsed but not actionable

mod parser;
mod rebalance;
mod scheduled_change;
mod spot_interruption;
mod state_change;

pub use parser::{EventParser, ParseError, SubParser};
pub use rebalance::{RebalanceDetail, RebalanceRecommendation, RebalanceRecommendationParser};
pub use scheduled_change::{
    AffectedEntity, ScheduledChange, ScheduledChangeDetail, ScheduledChangeParser,
};
pub use spot_interruption::{SpotInterruption, SpotInterruptionDetail, SpotInterruptionParser};
pub use state_change::{StateChange, StateChangeDetail, StateChangeParser};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Message kind discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Scheduled maintenance on the instance
    ScheduledChange,
    /// Spot capacity is being reclaimed
    #[serde(rename = "spot_interrupted")]
    SpotInterruption,
    /// Instance is at elevated risk of interruption
    RebalanceRecommendation,
    /// Instance transitioned to a stopping or terminating state
    StateChange,
    /// Not actionable
    NoOp,
}

impl Kind {
    /// Every kind, in declaration order
    pub const ALL: [Kind; 5] = [
        Kind::ScheduledChange,
        Kind::SpotInterruption,
        Kind::RebalanceRecommendation,
        Kind::StateChange,
        Kind::NoOp,
    ];

    /// Stable label value used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::ScheduledChange => "scheduled_change",
            Kind::SpotInterruption => "spot_interrupted",
            Kind::RebalanceRecommendation => "rebalance_recommendation",
            Kind::StateChange => "state_change",
            Kind::NoOp => "no_op",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deserialize an explicit `null` as the type's default, like a missing key
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Envelope fields shared by every event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub version: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "detail-type", default, deserialize_with = "null_as_default")]
    pub detail_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub account: String,
    /// Time the event originated at the source
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub region: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<String>,
}

/// A message that parsed but carries nothing actionable
#[derive(Debug, Clone, PartialEq)]
pub struct NoOp {
    pub metadata: Metadata,
}

/// A parsed interruption message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ScheduledChange(ScheduledChange),
    SpotInterruption(SpotInterruption),
    RebalanceRecommendation(RebalanceRecommendation),
    StateChange(StateChange),
    NoOp(NoOp),
}

impl Message {
    /// Kind of this message
    pub fn kind(&self) -> Kind {
        match self {
            Message::ScheduledChange(_) => Kind::ScheduledChange,
            Message::SpotInterruption(_) => Kind::SpotInterruption,
            Message::RebalanceRecommendation(_) => Kind::RebalanceRecommendation,
            Message::StateChange(_) => Kind::StateChange,
            Message::NoOp(_) => Kind::NoOp,
        }
    }

    /// Envelope metadata
    pub fn metadata(&self) -> &Metadata {
        match self {
            Message::ScheduledChange(m) => &m.metadata,
            Message::SpotInterruption(m) => &m.metadata,
            Message::RebalanceRecommendation(m) => &m.metadata,
            Message::StateChange(m) => &m.metadata,
            Message::NoOp(m) => &m.metadata,
        }
    }

    /// Cloud instance identifiers this event concerns
    pub fn ec2_instance_ids(&self) -> Vec<String> {
        match self {
            Message::ScheduledChange(m) => m
                .detail
                .affected_entities
                .iter()
                .map(|e| e.entity_value.clone())
                .collect(),
            Message::SpotInterruption(m) => vec![m.detail.instance_id.clone()],
            Message::RebalanceRecommendation(m) => vec![m.detail.instance_id.clone()],
            Message::StateChange(m) => vec![m.detail.instance_id.clone()],
            Message::NoOp(_) => Vec::new(),
        }
    }

    /// Origin timestamp of the event, when the source provided one
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.metadata().time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(Kind::SpotInterruption.as_str(), "spot_interrupted");
        assert_eq!(Kind::NoOp.to_string(), "no_op");
        assert_eq!(
            serde_json::to_string(&Kind::SpotInterruption).unwrap(),
            "\"spot_interrupted\""
        );
        assert_eq!(
            serde_json::to_string(&Kind::RebalanceRecommendation).unwrap(),
            "\"rebalance_recommendation\""
        );
    }

    #[test]
    fn test_noop_has_no_instances() {
        let msg = Message::NoOp(NoOp {
            metadata: Metadata::default(),
        });
        assert_eq!(msg.kind(), Kind::NoOp);
        assert!(msg.ec2_instance_ids().is_empty());
        assert!(msg.start_time().is_none());
    }
}
