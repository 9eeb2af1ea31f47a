//! Provider identifier parsing
//!
//! NodeClaims and Nodes carry the backing instance as `aws:///<zone>/<instance-id>`.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static PROVIDER_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^aws:///(?P<zone>[^/]*)/(?P<instance_id>[^/]+)$")
        .expect("provider id pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid provider id {0:?}")]
pub struct InvalidProviderId(pub String);

/// Parsed provider identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId {
    /// Availability zone, may be empty
    pub zone: String,
    /// Cloud instance identifier
    pub instance_id: String,
}

impl FromStr for ProviderId {
    type Err = InvalidProviderId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PROVIDER_ID
            .captures(s)
            .ok_or_else(|| InvalidProviderId(s.to_string()))?;
        Ok(Self {
            zone: caps["zone"].to_string(),
            instance_id: caps["instance_id"].to_string(),
        })
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "aws:///{}/{}", self.zone, self.instance_id)
    }
}

/// Extract the instance identifier from a provider id
pub fn parse_instance_id(provider_id: &str) -> Result<String, InvalidProviderId> {
    provider_id.parse::<ProviderId>().map(|id| id.instance_id)
}
