//! Event parser
//!
//! Dispatches a raw queue body to the first registered sub-parser whose
//! `(version, source, detail-type)` matches the envelope. Envelopes nobody
//! claims become [`Message::NoOp`] so new event sources never fail parsing.

use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use super::{
    Message, Metadata, NoOp, RebalanceRecommendationParser, ScheduledChangeParser,
    SpotInterruptionParser, StateChangeParser,
};

/// Errors produced while parsing a message body.
///
/// Every variant is a malformed payload: the body will never parse on
/// redelivery, so callers delete the message after logging.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body absent or empty
    #[error("message body is empty")]
    EmptyBody,

    /// Body is not JSON
    #[error("malformed payload: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// Body is JSON but not an event envelope
    #[error("malformed payload: expected a JSON object")]
    NotAnObject,

    /// Envelope claimed by a sub-parser whose detail did not decode
    #[error("malformed payload: invalid {detail_type} detail: {source}")]
    InvalidDetail {
        detail_type: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ParseError {
    /// Every parse failure is permanent: redelivery cannot fix the payload
    pub fn is_malformed(&self) -> bool {
        match self {
            ParseError::EmptyBody
            | ParseError::InvalidJson(_)
            | ParseError::NotAnObject
            | ParseError::InvalidDetail { .. } => true,
        }
    }
}

/// A parser for one kind of event envelope
pub trait SubParser: Send + Sync {
    /// Envelope schema version this parser understands
    fn version(&self) -> &str {
        "0"
    }

    /// Event source, e.g. `aws.ec2`
    fn source(&self) -> &str;

    /// Event detail type
    fn detail_type(&self) -> &str;

    /// Build a message from the envelope metadata and its `detail` payload
    fn parse(&self, metadata: Metadata, detail: Value) -> Result<Message, ParseError>;

    /// Whether this parser handles envelopes with the given metadata
    fn claims(&self, metadata: &Metadata) -> bool {
        metadata.version == self.version()
            && metadata.source == self.source()
            && metadata.detail_type == self.detail_type()
    }
}

/// Ordered set of sub-parsers, first match wins
pub struct EventParser {
    parsers: Vec<Box<dyn SubParser>>,
}

impl EventParser {
    /// Create a parser with the given sub-parsers, tried in order
    pub fn new(parsers: Vec<Box<dyn SubParser>>) -> Self {
        Self { parsers }
    }

    /// Append a sub-parser after the already registered ones
    pub fn register(&mut self, parser: Box<dyn SubParser>) {
        self.parsers.push(parser);
    }

    /// Number of registered sub-parsers
    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    /// Whether no sub-parser is registered
    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Parse a raw queue body
    pub fn parse(&self, body: &str) -> Result<Message, ParseError> {
        if body.trim().is_empty() {
            return Err(ParseError::EmptyBody);
        }

        let mut value: Value = serde_json::from_str(body).map_err(ParseError::InvalidJson)?;
        let object = value.as_object_mut().ok_or(ParseError::NotAnObject)?;
        let detail = object.remove("detail").unwrap_or(Value::Null);
        let metadata: Metadata = serde_json::from_value(value).map_err(ParseError::InvalidJson)?;

        match self.parsers.iter().find(|p| p.claims(&metadata)) {
            Some(parser) => parser.parse(metadata, detail),
            None => {
                trace!(
                    source = %metadata.source,
                    detail_type = %metadata.detail_type,
                    "No sub-parser registered for event"
                );
                Ok(Message::NoOp(NoOp { metadata }))
            }
        }
    }
}

impl Default for EventParser {
    /// Parser for the EC2 and Health event sources
    fn default() -> Self {
        Self::new(vec![
            Box::new(ScheduledChangeParser),
            Box::new(SpotInterruptionParser),
            Box::new(RebalanceRecommendationParser),
            Box::new(StateChangeParser),
        ])
    }
}

/// Decode a detail payload, attributing failures to the detail type
pub(crate) fn decode_detail<T: serde::de::DeserializeOwned>(
    metadata: &Metadata,
    detail: Value,
) -> Result<T, ParseError> {
    serde_json::from_value(detail).map_err(|source| ParseError::InvalidDetail {
        detail_type: metadata.detail_type.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::Kind;

    const SPOT: &str = r#"{
        "version": "0",
        "id": "1e5527d7-bb36-4607-3370-4164db56a40e",
        "detail-type": "EC2 Spot Instance Interruption Warning",
        "source": "aws.ec2",
        "account": "123456789012",
        "time": "2022-10-20T15:04:05Z",
        "region": "us-east-1",
        "resources": ["arn:aws:ec2:us-east-1a:instance/i-0b2a5e0b6d5c4e3f1"],
        "detail": {
            "instance-id": "i-0b2a5e0b6d5c4e3f1",
            "instance-action": "terminate"
        }
    }"#;

    struct AuditParser;

    impl SubParser for AuditParser {
        fn source(&self) -> &str {
            "example.audit"
        }

        fn detail_type(&self) -> &str {
            "Audit"
        }

        fn parse(&self, metadata: Metadata, _detail: Value) -> Result<Message, ParseError> {
            Ok(Message::NoOp(NoOp { metadata }))
        }
    }

    #[test]
    fn test_parse_spot_interruption() {
        let msg = EventParser::default().parse(SPOT).unwrap();
        assert_eq!(msg.kind(), Kind::SpotInterruption);
        assert_eq!(msg.ec2_instance_ids(), vec!["i-0b2a5e0b6d5c4e3f1"]);
        assert_eq!(
            msg.start_time().unwrap().to_rfc3339(),
            "2022-10-20T15:04:05+00:00"
        );
        assert_eq!(msg.metadata().region, "us-east-1");
    }

    #[test]
    fn test_unknown_detail_type_is_noop() {
        let body = r#"{"version":"0","source":"aws.ec2","detail-type":"EC2 Something New","detail":{"x":1}}"#;
        let msg = EventParser::default().parse(body).unwrap();
        assert_eq!(msg.kind(), Kind::NoOp);
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let body = r#"{
            "version": "0",
            "id": null,
            "detail-type": "EC2 Spot Instance Interruption Warning",
            "source": "aws.ec2",
            "account": null,
            "time": null,
            "region": null,
            "resources": null,
            "detail": {"instance-id": "i-1", "instance-action": null}
        }"#;
        let msg = EventParser::default().parse(body).unwrap();
        assert_eq!(msg.kind(), Kind::SpotInterruption);
        assert_eq!(msg.ec2_instance_ids(), vec!["i-1"]);
        assert!(msg.metadata().resources.is_empty());
        assert!(msg.metadata().region.is_empty());
        assert!(msg.start_time().is_none());
    }

    #[test]
    fn test_unknown_detail_type_with_nulls_is_noop() {
        let body = r#"{"version":"0","source":"aws.ec2","detail-type":"Something New","region":null,"resources":null,"detail":null}"#;
        let msg = EventParser::default().parse(body).unwrap();
        assert_eq!(msg.kind(), Kind::NoOp);
    }

    #[test]
    fn test_null_detail_fields_in_other_kinds() {
        let state = r#"{"version":"0","source":"aws.ec2","detail-type":"EC2 Instance State-change Notification","resources":null,"detail":{"instance-id":"i-2","state":"stopping"}}"#;
        assert_eq!(EventParser::default().parse(state).unwrap().kind(), Kind::StateChange);

        let health = r#"{"version":"0","source":"aws.health","detail-type":"AWS Health Event","detail":{"service":"EC2","eventTypeCategory":"scheduledChange","eventArn":null,"startTime":null,"affectedEntities":[{"entityValue":"i-3"}]}}"#;
        let msg = EventParser::default().parse(health).unwrap();
        assert_eq!(msg.kind(), Kind::ScheduledChange);
        assert_eq!(msg.ec2_instance_ids(), vec!["i-3"]);
    }

    #[test]
    fn test_unknown_source_is_noop() {
        for body in [
            r#"{"source":"aws.s3","detail-type":"Object Created"}"#,
            r#"{"Event":"s3:TestEvent","Service":"Amazon S3"}"#,
            r#"{}"#,
        ] {
            let msg = EventParser::default().parse(body).unwrap();
            assert_eq!(msg.kind(), Kind::NoOp, "body: {}", body);
        }
    }

    #[test]
    fn test_version_mismatch_is_noop() {
        let body = SPOT.replace(r#""version": "0""#, r#""version": "1""#);
        let msg = EventParser::default().parse(&body).unwrap();
        assert_eq!(msg.kind(), Kind::NoOp);
    }

    #[test]
    fn test_empty_body_rejected() {
        assert!(matches!(
            EventParser::default().parse(""),
            Err(ParseError::EmptyBody)
        ));
        assert!(matches!(
            EventParser::default().parse("   \n"),
            Err(ParseError::EmptyBody)
        ));
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(matches!(
            EventParser::default().parse("not json at all"),
            Err(ParseError::InvalidJson(_))
        ));
        assert!(matches!(
            EventParser::default().parse("[1, 2, 3]"),
            Err(ParseError::NotAnObject)
        ));
        assert!(EventParser::default()
            .parse("{")
            .unwrap_err()
            .is_malformed());
    }

    #[test]
    fn test_invalid_time_rejected() {
        let body = r#"{"source":"aws.ec2","detail-type":"x","time":"yesterday"}"#;
        assert!(matches!(
            EventParser::default().parse(body),
            Err(ParseError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_claimed_envelope_with_bad_detail_rejected() {
        let body = r#"{"version":"0","source":"aws.ec2","detail-type":"EC2 Spot Instance Interruption Warning","detail":{"instance-id":42}}"#;
        let err = EventParser::default().parse(body).unwrap_err();
        assert!(matches!(err, ParseError::InvalidDetail { .. }));
        assert!(err.to_string().contains("EC2 Spot Instance Interruption Warning"));
    }

    #[test]
    fn test_register_extends_dispatch() {
        let mut parser = EventParser::new(Vec::new());
        assert!(parser.is_empty());
        parser.register(Box::new(AuditParser));
        assert_eq!(parser.len(), 1);

        let msg = parser
            .parse(r#"{"version":"0","source":"example.audit","detail-type":"Audit"}"#)
            .unwrap();
        assert_eq!(msg.metadata().source, "example.audit");

        // Nothing else registered, so spot warnings become no-ops here
        assert_eq!(parser.parse(SPOT).unwrap().kind(), Kind::NoOp);
    }
}
