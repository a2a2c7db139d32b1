//! Identity gateway backed by the local user directory tables.

use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

use common::prelude::UserId;

use crate::database::types::{DTimestamp, DUserId};
use crate::database::Database;
use crate::identity::{IdentityError, IdentityGateway, UserProfile};

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct PublishedKeys {
    pub signing_public_key: Option<String>,
    pub ecc_public_key: Option<String>,
    pub rsa_public_key: Option<String>,
}

#[derive(Debug, FromRow)]
struct UserRow {
    user_id: DUserId,
    display_name: String,
    signing_public_key: Option<String>,
    ecc_public_key: Option<String>,
    rsa_public_key: Option<String>,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: *row.user_id,
            display_name: row.display_name,
            signing_public_key: row.signing_public_key,
            ecc_public_key: row.ecc_public_key,
            rsa_public_key: row.rsa_public_key,
        }
    }
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone, Debug)]
pub struct DirectoryIdentity {
    db: Database,
}

impl DirectoryIdentity {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn register_user(
        &self,
        display_name: &str,
        keys: &PublishedKeys,
    ) -> Result<UserId, sqlx::Error> {
        let user_id = UserId::generate();

        sqlx::query(
            r#"
            INSERT INTO users (
                user_id, display_name, signing_public_key,
                ecc_public_key, rsa_public_key, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(DUserId::from(user_id))
        .bind(display_name)
        .bind(&keys.signing_public_key)
        .bind(&keys.ecc_public_key)
        .bind(&keys.rsa_public_key)
        .bind(DTimestamp::from(OffsetDateTime::now_utc()))
        .execute(&*self.db)
        .await?;

        tracing::info!(user_id = %user_id, display_name, "registered user");
        Ok(user_id)
    }

    /// Replace the published keys of an existing user. Returns false if the
    /// user does not exist.
    pub async fn publish_keys(
        &self,
        user_id: &UserId,
        keys: &PublishedKeys,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET signing_public_key = ?1, ecc_public_key = ?2, rsa_public_key = ?3
            WHERE user_id = ?4
            "#,
        )
        .bind(&keys.signing_public_key)
        .bind(&keys.ecc_public_key)
        .bind(&keys.rsa_public_key)
        .bind(DUserId::from(*user_id))
        .execute(&*self.db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Mint a bearer token for `user_id`. Only its digest is stored, so the
    /// returned value is the one copy of the token.
    pub async fn issue_token(
        &self,
        user_id: &UserId,
        ttl: Option<Duration>,
    ) -> Result<String, sqlx::Error> {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        let expires_at = ttl.map(|ttl| DTimestamp::from(OffsetDateTime::now_utc() + ttl));

        sqlx::query("INSERT INTO access_tokens (token_hash, user_id, expires_at) VALUES (?1, ?2, ?3)")
            .bind(hash_token(&token))
            .bind(DUserId::from(*user_id))
            .bind(expires_at)
            .execute(&*self.db)
            .await?;

        Ok(token)
    }
}

#[async_trait]
impl IdentityGateway for DirectoryIdentity {
    async fn resolve_caller(&self, credentials: &str) -> Result<UserId, IdentityError> {
        let row: Option<(DUserId,)> = sqlx::query_as(
            r#"
            SELECT user_id FROM access_tokens
            WHERE token_hash = ?1 AND (expires_at IS NULL OR expires_at > ?2)
            "#,
        )
        .bind(hash_token(credentials))
        .bind(DTimestamp::from(OffsetDateTime::now_utc()))
        .fetch_optional(&*self.db)
        .await
        .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        row.map(|(user_id,)| *user_id)
            .ok_or(IdentityError::InvalidCredentials)
    }

    async fn lookup_user(&self, id: &UserId) -> Result<Option<UserProfile>, IdentityError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT user_id, display_name, signing_public_key, ecc_public_key, rsa_public_key
            FROM users
            WHERE user_id = ?1
            "#,
        )
        .bind(DUserId::from(*id))
        .fetch_optional(&*self.db)
        .await
        .map_err(|e| IdentityError::Unavailable(e.to_string()))?;

        Ok(row.map(UserProfile::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signing_only(key: &str) -> PublishedKeys {
        PublishedKeys {
            signing_public_key: Some(key.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_token_resolves_to_its_user() {
        let directory = DirectoryIdentity::new(Database::in_memory().await.unwrap());
        let alice = directory
            .register_user("alice", &signing_only("pk-a"))
            .await
            .unwrap();
        let token = directory.issue_token(&alice, None).await.unwrap();

        assert_eq!(directory.resolve_caller(&token).await.unwrap(), alice);
        assert!(matches!(
            directory.resolve_caller("not-a-token").await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let directory = DirectoryIdentity::new(Database::in_memory().await.unwrap());
        let alice = directory
            .register_user("alice", &PublishedKeys::default())
            .await
            .unwrap();
        let token = directory
            .issue_token(&alice, Some(Duration::seconds(-1)))
            .await
            .unwrap();

        assert!(matches!(
            directory.resolve_caller(&token).await,
            Err(IdentityError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_publish_keys_updates_profile() {
        let directory = DirectoryIdentity::new(Database::in_memory().await.unwrap());
        let bob = directory
            .register_user("bob", &PublishedKeys::default())
            .await
            .unwrap();

        let profile = directory.lookup_user(&bob).await.unwrap().unwrap();
        assert!(!profile.has_exchange_keys());

        assert!(directory.publish_keys(&bob, &signing_only("pk-b")).await.unwrap());
        let profile = directory.lookup_user(&bob).await.unwrap().unwrap();
        assert!(profile.has_exchange_keys());
        assert_eq!(profile.display_name, "bob");

        assert!(!directory
            .publish_keys(&UserId::generate(), &signing_only("pk"))
            .await
            .unwrap());
        assert!(directory.lookup_user(&UserId::generate()).await.unwrap().is_none());
    }
}
