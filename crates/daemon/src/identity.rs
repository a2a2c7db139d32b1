//! Caller authentication and user lookup.
//!
//! The relay does not own accounts or credentials. It asks an
//! [`IdentityGateway`] who a bearer credential belongs to and what public
//! key material a user has published.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::prelude::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    pub signing_public_key: Option<String>,
    pub ecc_public_key: Option<String>,
    pub rsa_public_key: Option<String>,
}

impl UserProfile {
    /// A user can take part in a key exchange once a signing key is published
    pub fn has_exchange_keys(&self) -> bool {
        self.signing_public_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid or expired credentials")]
    InvalidCredentials,
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityGateway {
    /// Map a bearer credential to the user it was issued to
    async fn resolve_caller(&self, credentials: &str) -> Result<UserId, IdentityError>;

    async fn lookup_user(&self, id: &UserId) -> Result<Option<UserProfile>, IdentityError>;
}

pub type DynIdentityGateway = Arc<dyn IdentityGateway + Send + Sync>;

/// Look up several users at once, skipping ids that resolve to nobody
pub async fn lookup_profiles(
    gateway: &(dyn IdentityGateway + Send + Sync),
    ids: impl IntoIterator<Item = UserId>,
) -> Result<HashMap<UserId, UserProfile>, IdentityError> {
    let unique: HashSet<UserId> = ids.into_iter().collect();
    let mut profiles = HashMap::with_capacity(unique.len());
    for id in unique {
        if let Some(profile) = gateway.lookup_user(&id).await? {
            profiles.insert(id, profile);
        }
    }
    Ok(profiles)
}

/// A user as shown in listings: the id plus whatever name the directory
/// still has for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: UserId,
    pub display_name: Option<String>,
}

impl Participant {
    pub fn resolve(id: UserId, profiles: &HashMap<UserId, UserProfile>) -> Self {
        Self {
            id,
            display_name: profiles.get(&id).map(|p| p.display_name.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(signing_public_key: Option<&str>) -> UserProfile {
        UserProfile {
            id: UserId::generate(),
            display_name: "alice".to_string(),
            signing_public_key: signing_public_key.map(str::to_string),
            ecc_public_key: None,
            rsa_public_key: None,
        }
    }

    #[test]
    fn test_exchange_keys_require_non_empty_signing_key() {
        assert!(profile(Some("pk")).has_exchange_keys());
        assert!(!profile(Some("")).has_exchange_keys());
        assert!(!profile(None).has_exchange_keys());
    }

    #[test]
    fn test_participant_without_profile_has_no_name() {
        let known = profile(None);
        let profiles = HashMap::from([(known.id, known.clone())]);

        assert_eq!(
            Participant::resolve(known.id, &profiles).display_name.as_deref(),
            Some("alice")
        );
        assert_eq!(
            Participant::resolve(UserId::generate(), &profiles).display_name,
            None
        );
    }
}
