//! EC2 instance state-change notifications

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::{decode_detail, ParseError, SubParser};
use super::{Message, Metadata, NoOp};

/// States that require the node to be drained
pub const ACCEPTED_STATES: [&str; 4] = ["stopping", "stopped", "shutting-down", "terminated"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangeDetail {
    #[serde(rename = "instance-id", deserialize_with = "super::null_as_default")]
    pub instance_id: String,
    #[serde(deserialize_with = "super::null_as_default")]
    pub state: String,
}

/// The instance moved to a stopping or terminating state
#[derive(Debug, Clone, PartialEq)]
pub struct StateChange {
    pub metadata: Metadata,
    pub detail: StateChangeDetail,
}

impl StateChange {
    /// Whether the instance is stopping rather than terminating
    pub fn is_stopping(&self) -> bool {
        matches!(self.detail.state.as_str(), "stopping" | "stopped")
    }
}

pub struct StateChangeParser;

impl SubParser for StateChangeParser {
    fn source(&self) -> &str {
        "aws.ec2"
    }

    fn detail_type(&self) -> &str {
        "EC2 Instance State-change Notification"
    }

    fn parse(&self, metadata: Metadata, detail: Value) -> Result<Message, ParseError> {
        let detail: StateChangeDetail = decode_detail(&metadata, detail)?;
        if !ACCEPTED_STATES.contains(&detail.state.to_lowercase().as_str()) {
            return Ok(Message::NoOp(NoOp { metadata }));
        }
        Ok(Message::StateChange(StateChange { metadata, detail }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EventParser, Kind};

    fn body(state: &str) -> String {
        format!(
            r#"{{
                "version": "0",
                "id": "7bf73129-1428-4cd3-a780-95db273d1602",
                "detail-type": "EC2 Instance State-change Notification",
                "source": "aws.ec2",
                "time": "2022-10-20T15:04:05Z",
                "region": "us-east-1",
                "detail": {{"instance-id": "i-abcdef", "state": "{}"}}
            }}"#,
            state
        )
    }

    #[test]
    fn test_accepted_states() {
        let parser = EventParser::default();
        for state in ACCEPTED_STATES {
            let msg = parser.parse(&body(state)).unwrap();
            assert_eq!(msg.kind(), Kind::StateChange, "state: {}", state);
            assert_eq!(msg.ec2_instance_ids(), vec!["i-abcdef"]);
        }
    }

    #[test]
    fn test_other_states_are_noop() {
        let parser = EventParser::default();
        for state in ["pending", "running"] {
            let msg = parser.parse(&body(state)).unwrap();
            assert_eq!(msg.kind(), Kind::NoOp, "state: {}", state);
        }
    }

    #[test]
    fn test_is_stopping() {
        let parser = EventParser::default();
        let stopping = |state: &str| match parser.parse(&body(state)).unwrap() {
            Message::StateChange(m) => m.is_stopping(),
            other => panic!("unexpected message {:?}", other),
        };
        assert!(stopping("stopping"));
        assert!(stopping("stopped"));
        assert!(!stopping("shutting-down"));
        assert!(!stopping("terminated"));
    }
}
