// ── Resource identity ──
//
// Every polled feed (a camera, the incident list) is keyed by a
// `ResourceId`. The backend uses small integers for cameras and
// incidents, but the core never interprets the value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque, stable identifier for a polled resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ResourceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<String> for ResourceId {
    fn from(s: String) -> Self {
        Self(s.trim().to_owned())
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_owned())
    }
}

impl From<u64> for ResourceId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl AsRef<str> for ResourceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_and_textual_ids_compare_equal() {
        assert_eq!(ResourceId::from(4_u64), ResourceId::from("4"));
        assert_eq!(ResourceId::from(" cam-1 ").as_str(), "cam-1");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&ResourceId::from("7")).unwrap_or_default();
        assert_eq!(json, "\"7\"");
    }
}
