//! # Identities
//!
//! Every participant the relay knows about is addressed by a [`UserId`].
//! The identity service issues them; the relay only parses, stores and
//! compares them.
//!
//! A `UserId` has exactly one textual form (lowercase, hyphenated UUID), so
//! two ids are equal if and only if their strings are equal. Anything that
//! does not parse is not an identity.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UserIdError {
    #[error("invalid user id: {0}")]
    Invalid(String),
}

/// Stable identity of a relay participant.
///
/// Serializes as its canonical string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(Uuid);

impl UserId {
    /// Mint a fresh identity. Only the identity directory should call this.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Deref for UserId {
    type Target = Uuid;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<UserId> for Uuid {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s.trim()).map_err(|_| UserIdError::Invalid(s.to_string()))?;
        Ok(Self(uuid))
    }
}

impl TryFrom<String> for UserId {
    type Error = UserIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_hyphenated())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_form_compares_equal() {
        let id = UserId::generate();
        let upper = id.to_string().to_uppercase();
        let reparsed: UserId = upper.parse().unwrap();
        assert_eq!(id, reparsed);
        assert_eq!(reparsed.to_string(), id.to_string());
    }

    #[test]
    fn test_rejects_non_uuid() {
        assert!("alice".parse::<UserId>().is_err());
        assert!("".parse::<UserId>().is_err());
        assert!("64f1c2a9e4b0a1b2c3d4e5f6".parse::<UserId>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = UserId::generate();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);

        assert!(serde_json::from_str::<UserId>("\"not-an-id\"").is_err());
    }
}
