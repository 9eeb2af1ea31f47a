//! EC2 instance rebalance recommendations

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::parser::{decode_detail, ParseError, SubParser};
use super::{Message, Metadata};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceDetail {
    #[serde(rename = "instance-id", deserialize_with = "super::null_as_default")]
    pub instance_id: String,
}

/// The instance is at elevated risk of interruption. Advisory only.
#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceRecommendation {
    pub metadata: Metadata,
    pub detail: RebalanceDetail,
}

pub struct RebalanceRecommendationParser;

impl SubParser for RebalanceRecommendationParser {
    fn source(&self) -> &str {
        "aws.ec2"
    }

    fn detail_type(&self) -> &str {
        "EC2 Instance Rebalance Recommendation"
    }

    fn parse(&self, metadata: Metadata, detail: Value) -> Result<Message, ParseError> {
        let detail = decode_detail(&metadata, detail)?;
        Ok(Message::RebalanceRecommendation(RebalanceRecommendation {
            metadata,
            detail,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{EventParser, Kind};

    #[test]
    fn test_parse_rebalance() {
        let body = r#"{
            "version": "0",
            "id": "5d5b9b26-9c2a-4d37-8d1b-0f2d3e2b6d11",
            "detail-type": "EC2 Instance Rebalance Recommendation",
            "source": "aws.ec2",
            "time": "2022-10-20T15:04:05Z",
            "region": "us-west-2",
            "detail": {"instance-id": "i-0123456789abcdef0"}
        }"#;
        let msg = EventParser::default().parse(body).unwrap();
        assert_eq!(msg.kind(), Kind::RebalanceRecommendation);
        assert_eq!(msg.ec2_instance_ids(), vec!["i-0123456789abcdef0"]);
    }
}
