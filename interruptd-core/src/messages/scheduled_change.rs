//! Health scheduled-change events

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::{decode_detail, ParseError, SubParser};
use super::{Message, Metadata, NoOp};

const ACCEPTED_SERVICES: [&str; 1] = ["EC2"];
const ACCEPTED_EVENT_TYPE_CATEGORIES: [&str; 1] = ["scheduledChange"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AffectedEntity {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub entity_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledChangeDetail {
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub event_arn: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub event_type_code: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub service: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub event_type_category: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub start_time: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub end_time: String,
    #[serde(default, deserialize_with = "super::null_as_default")]
    pub affected_entities: Vec<AffectedEntity>,
}

/// Scheduled maintenance affecting one or more instances
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledChange {
    pub metadata: Metadata,
    pub detail: ScheduledChangeDetail,
}

pub struct ScheduledChangeParser;

impl SubParser for ScheduledChangeParser {
    fn source(&self) -> &str {
        "aws.health"
    }

    fn detail_type(&self) -> &str {
        "AWS Health Event"
    }

    fn parse(&self, metadata: Metadata, detail: Value) -> Result<Message, ParseError> {
        let detail: ScheduledChangeDetail = decode_detail(&metadata, detail)?;
        // Only EC2 scheduled changes concern our instances
        if !ACCEPTED_SERVICES.contains(&detail.service.as_str())
            || !ACCEPTED_EVENT_TYPE_CATEGORIES.contains(&detail.event_type_category.as_str())
        {
            return Ok(Message::NoOp(NoOp { metadata }));
        }
        Ok(Message::ScheduledChange(ScheduledChange { metadata, detail }))
    }
}
