use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LexfuseError;

/// Stable, caller-assigned document identifier.
pub type DocId = String;

/// A scalar metadata value. Arrays, objects and nulls are not representable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    /// Boolean flag.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// Free text.
    Text(String),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// Per-document metadata, ordered by key so snapshots serialize stably.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// One entry of a ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    /// Document id.
    pub id: DocId,
    /// Ranking score; higher is better.
    pub score: f32,
}

impl ScoredDoc {
    /// Creates a new scored entry.
    pub fn new(id: impl Into<DocId>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Opaque, unguessable session identifier (random v4 UUID, 122 bits of entropy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random session id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = LexfuseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| LexfuseError::validation(format!("malformed session id: {e}")))?;
        if uuid.get_version_num() != 4 {
            return Err(LexfuseError::validation(
                "session id is not a random (v4) identifier",
            ));
        }
        Ok(Self(uuid))
    }
}
