//! EC2 spot interruption warnings

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::{decode_detail, ParseError, SubParser};
use super::{Message, Metadata};

/// Detail of a spot interruption warning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotInterruptionDetail {
    #[serde(rename = "instance-id", deserialize_with = "super::null_as_default")]
    pub instance_id: String,
    /// `terminate`, `stop` or `hibernate`
    #[serde(rename = "instance-action", default, deserialize_with = "super::null_as_default")]
    pub instance_action: String,
}

/// Spot capacity is being reclaimed, roughly two minutes of notice
#[derive(Debug, Clone, PartialEq)]
pub struct SpotInterruption {
    pub metadata: Metadata,
    pub detail: SpotInterruptionDetail,
}

pub struct SpotInterruptionParser;

impl SubParser for SpotInterruptionParser {
    fn source(&self) -> &str {
        "aws.ec2"
    }

    fn detail_type(&self) -> &str {
        "EC2 Spot Instance Interruption Warning"
    }

    fn parse(&self, metadata: Metadata, detail: Value) -> Result<Message, ParseError> {
        let detail = decode_detail(&metadata, detail)?;
        Ok(Message::SpotInterruption(SpotInterruption { metadata, detail }))
    }
}
