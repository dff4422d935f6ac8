use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifier of one `publish` call, backed by ULID.
///
/// Carried on the publish span so the routing, validation and every target's
/// send can be correlated in the logs.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct PublishId(pub ulid::Ulid);

impl PublishId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn from_ulid(id: ulid::Ulid) -> Self {
        Self(id)
    }

    /// Reuse a caller-supplied correlation id when it parses, else mint one.
    pub fn from_option_or_new(value: Option<&str>) -> Self {
        value
            .and_then(|s| s.parse::<PublishId>().ok())
            .unwrap_or_default()
    }
}

impl Default for PublishId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PublishId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PublishId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = ulid::Ulid::from_string(s)?;
        Ok(PublishId(id))
    }
}

impl Serialize for PublishId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PublishId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<PublishId>()
            .map_err(|_| serde::de::Error::custom("invalid publish id"))
    }
}
