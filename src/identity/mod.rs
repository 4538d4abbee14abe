use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// NetworkIdentity uniquely identifies a network-enabled entity.
///
/// Assigned once when the entity is created and never reassigned.
/// Generated from UUID v4 (OS randomness), so identities created by
/// independently started processes do not collide in practice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkIdentity(Uuid);

impl NetworkIdentity {
    /// Create a fresh identity
    pub fn create() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identity from its hyphenated (or simple) textual form
    pub fn parse(text: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(text).map(Self)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// True for the all-zero identity, which is never handed out by `create`
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for NetworkIdentity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for NetworkIdentity {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
