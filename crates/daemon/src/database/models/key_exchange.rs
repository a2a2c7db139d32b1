use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use time::{Duration, OffsetDateTime};

use common::prelude::{InitiatorRound, ResponderRound, SessionStatus, UserId};

use crate::database::types::{DStatus, DTimestamp, DUserId};
use crate::database::Database;

/// How long an exchange stays usable after it is initiated
pub const SESSION_TTL: Duration = Duration::hours(24);

macro_rules! select_sessions {
    ($tail:literal) => {
        concat!(
            r#"
            SELECT
                session_id, initiator_id, responder_id, status,
                initiator_ecdh_public_key, initiator_challenge,
                initiator_timestamp, initiator_signature,
                responder_ecdh_public_key, responder_challenge_response,
                responder_timestamp, responder_signature,
                initiated_at, completed_at, expires_at
            FROM key_exchange_sessions
            "#,
            $tail
        )
    };
}

/// A brokered key exchange between two users.
///
/// Rows past `expires_at` are never returned, whether or not the sweeper
/// has removed them yet.
#[derive(Debug, Clone, Serialize)]
pub struct KeyExchange {
    pub session_id: String,
    pub initiator_id: DUserId,
    pub responder_id: DUserId,
    pub status: DStatus,
    pub initiator_round: InitiatorRound,
    pub responder_round: Option<ResponderRound>,
    pub initiated_at: DTimestamp,
    pub completed_at: Option<DTimestamp>,
    pub expires_at: DTimestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct NewKeyExchange<'a> {
    pub session_id: &'a str,
    pub initiator_id: UserId,
    pub responder_id: UserId,
    pub round: &'a InitiatorRound,
}

impl<'r> FromRow<'r, SqliteRow> for KeyExchange {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let responder_round = match (
            row.try_get::<Option<String>, _>("responder_ecdh_public_key")?,
            row.try_get::<Option<String>, _>("responder_challenge_response")?,
            row.try_get::<Option<i64>, _>("responder_timestamp")?,
            row.try_get::<Option<String>, _>("responder_signature")?,
        ) {
            (Some(ecdh_public_key), Some(challenge_response), Some(timestamp), Some(signature)) => {
                Some(ResponderRound {
                    ecdh_public_key,
                    challenge_response,
                    timestamp,
                    signature,
                })
            }
            _ => None,
        };

        Ok(Self {
            session_id: row.try_get("session_id")?,
            initiator_id: row.try_get("initiator_id")?,
            responder_id: row.try_get("responder_id")?,
            status: row.try_get("status")?,
            initiator_round: InitiatorRound {
                ecdh_public_key: row.try_get("initiator_ecdh_public_key")?,
                challenge: row.try_get("initiator_challenge")?,
                timestamp: row.try_get("initiator_timestamp")?,
                signature: row.try_get("initiator_signature")?,
            },
            responder_round,
            initiated_at: row.try_get("initiated_at")?,
            completed_at: row.try_get("completed_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }
}

impl KeyExchange {
    /// Insert a pending exchange.
    ///
    /// A taken `session_id` surfaces as a unique violation from the store,
    /// so two racing inserts can never both succeed.
    pub async fn create(
        new: NewKeyExchange<'_>,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<KeyExchange, sqlx::Error> {
        let initiated_at = DTimestamp::from(now);
        let expires_at = DTimestamp::from(now + SESSION_TTL);

        sqlx::query(
            r#"
            INSERT INTO key_exchange_sessions (
                session_id, initiator_id, responder_id, status,
                initiator_ecdh_public_key, initiator_challenge,
                initiator_timestamp, initiator_signature,
                initiated_at, expires_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(new.session_id)
        .bind(DUserId::from(new.initiator_id))
        .bind(DUserId::from(new.responder_id))
        .bind(DStatus::from(SessionStatus::Pending))
        .bind(&new.round.ecdh_public_key)
        .bind(&new.round.challenge)
        .bind(new.round.timestamp)
        .bind(&new.round.signature)
        .bind(initiated_at)
        .bind(expires_at)
        .execute(&**db)
        .await?;

        Self::get(new.session_id, now, db)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(
        session_id: &str,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Option<KeyExchange>, sqlx::Error> {
        sqlx::query_as::<_, KeyExchange>(select_sessions!(
            "WHERE session_id = ?1 AND expires_at > ?2"
        ))
        .bind(session_id)
        .bind(DTimestamp::from(now))
        .fetch_optional(&**db)
        .await
    }

    /// Attach the responder's round and mark the exchange completed.
    ///
    /// The update only applies while the row is pending, unexpired and
    /// addressed to `responder_id`. Returns whether it applied; callers
    /// re-read the row to find out why it did not.
    pub async fn complete(
        session_id: &str,
        responder_id: UserId,
        round: &ResponderRound,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE key_exchange_sessions
            SET
                responder_ecdh_public_key = ?1,
                responder_challenge_response = ?2,
                responder_timestamp = ?3,
                responder_signature = ?4,
                status = ?5,
                completed_at = ?6
            WHERE session_id = ?7
              AND responder_id = ?8
              AND status = ?9
              AND expires_at > ?6
            "#,
        )
        .bind(&round.ecdh_public_key)
        .bind(&round.challenge_response)
        .bind(round.timestamp)
        .bind(&round.signature)
        .bind(DStatus::from(SessionStatus::Completed))
        .bind(DTimestamp::from(now))
        .bind(session_id)
        .bind(DUserId::from(responder_id))
        .bind(DStatus::from(SessionStatus::Pending))
        .execute(&**db)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Pending exchanges waiting on `responder_id`, newest first
    pub async fn pending_for(
        responder_id: UserId,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Vec<KeyExchange>, sqlx::Error> {
        sqlx::query_as::<_, KeyExchange>(select_sessions!(
            r#"
            WHERE responder_id = ?1 AND status = ?2 AND expires_at > ?3
            ORDER BY initiated_at DESC, rowid DESC
            "#
        ))
        .bind(DUserId::from(responder_id))
        .bind(DStatus::from(SessionStatus::Pending))
        .bind(DTimestamp::from(now))
        .fetch_all(&**db)
        .await
    }

    /// Exchanges `user_id` took part in on either side, newest first
    pub async fn history_for(
        user_id: UserId,
        limit: i64,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Vec<KeyExchange>, sqlx::Error> {
        sqlx::query_as::<_, KeyExchange>(select_sessions!(
            r#"
            WHERE (initiator_id = ?1 OR responder_id = ?1) AND expires_at > ?2
            ORDER BY initiated_at DESC, rowid DESC
            LIMIT ?3
            "#
        ))
        .bind(DUserId::from(user_id))
        .bind(DTimestamp::from(now))
        .bind(limit)
        .fetch_all(&**db)
        .await
    }

    /// The completed exchange `session_id`, if it is between exactly these
    /// two users in either direction
    pub async fn find_completed_between(
        session_id: &str,
        a: UserId,
        b: UserId,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Option<KeyExchange>, sqlx::Error> {
        sqlx::query_as::<_, KeyExchange>(select_sessions!(
            r#"
            WHERE session_id = ?1
              AND status = ?2
              AND expires_at > ?3
              AND ((initiator_id = ?4 AND responder_id = ?5)
                OR (initiator_id = ?5 AND responder_id = ?4))
            "#
        ))
        .bind(session_id)
        .bind(DStatus::from(SessionStatus::Completed))
        .bind(DTimestamp::from(now))
        .bind(DUserId::from(a))
        .bind(DUserId::from(b))
        .fetch_optional(&**db)
        .await
    }

    pub async fn delete_expired(now: OffsetDateTime, db: &Database) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM key_exchange_sessions WHERE expires_at <= ?1")
            .bind(DTimestamp::from(now))
            .execute(&**db)
            .await?;
        Ok(result.rows_affected())
    }

    pub fn involves(&self, user_id: UserId) -> bool {
        self.initiator_id == user_id || self.responder_id == user_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> InitiatorRound {
        InitiatorRound {
            ecdh_public_key: "ecdh-a".to_string(),
            challenge: "challenge".to_string(),
            timestamp: 1,
            signature: "sig-a".to_string(),
        }
    }

    fn reply() -> ResponderRound {
        ResponderRound {
            ecdh_public_key: "ecdh-b".to_string(),
            challenge_response: "challenge".to_string(),
            timestamp: 2,
            signature: "sig-b".to_string(),
        }
    }

    async fn create(
        session_id: &str,
        from: UserId,
        to: UserId,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<KeyExchange, sqlx::Error> {
        KeyExchange::create(
            NewKeyExchange {
                session_id,
                initiator_id: from,
                responder_id: to,
                round: &round(),
            },
            now,
            db,
        )
        .await
    }

    #[tokio::test]
    async fn test_create_and_complete() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        let session = create("s1", alice, bob, now, &db).await.unwrap();
        assert_eq!(*session.status, SessionStatus::Pending);
        assert_eq!(session.initiator_round, round());
        assert!(session.responder_round.is_none());
        assert_eq!(*session.expires_at - *session.initiated_at, SESSION_TTL);

        // only the addressed responder can complete
        assert!(!KeyExchange::complete("s1", alice, &reply(), now, &db).await.unwrap());
        assert!(KeyExchange::complete("s1", bob, &reply(), now, &db).await.unwrap());
        assert!(!KeyExchange::complete("s1", bob, &reply(), now, &db).await.unwrap());

        let session = KeyExchange::get("s1", now, &db).await.unwrap().unwrap();
        assert_eq!(*session.status, SessionStatus::Completed);
        assert_eq!(session.responder_round, Some(reply()));
        assert!(session.completed_at.is_some());
        assert!(session.involves(alice) && session.involves(bob));
    }

    #[tokio::test]
    async fn test_duplicate_session_id_is_a_unique_violation() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        create("s1", alice, bob, now, &db).await.unwrap();
        let err = create("s1", bob, alice, now, &db).await.unwrap_err();
        assert!(crate::database::unique_violation(&err).is_some());
    }

    #[tokio::test]
    async fn test_completed_rows_are_frozen() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        create("s1", alice, bob, now, &db).await.unwrap();
        KeyExchange::complete("s1", bob, &reply(), now, &db).await.unwrap();

        let result = sqlx::query("UPDATE key_exchange_sessions SET status = 'pending'")
            .execute(&*db)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_expired_rows_are_invisible() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        create("s1", alice, bob, now, &db).await.unwrap();
        let later = now + SESSION_TTL + Duration::seconds(1);

        assert!(KeyExchange::get("s1", later, &db).await.unwrap().is_none());
        assert!(KeyExchange::pending_for(bob, later, &db).await.unwrap().is_empty());
        assert!(!KeyExchange::complete("s1", bob, &reply(), later, &db).await.unwrap());

        assert_eq!(KeyExchange::delete_expired(now, &db).await.unwrap(), 0);
        assert_eq!(KeyExchange::delete_expired(later, &db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_find_completed_between_either_direction() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob, carol) = (UserId::generate(), UserId::generate(), UserId::generate());

        create("s1", alice, bob, now, &db).await.unwrap();
        assert!(KeyExchange::find_completed_between("s1", alice, bob, now, &db)
            .await
            .unwrap()
            .is_none());

        KeyExchange::complete("s1", bob, &reply(), now, &db).await.unwrap();
        for (a, b) in [(alice, bob), (bob, alice)] {
            assert!(KeyExchange::find_completed_between("s1", a, b, now, &db)
                .await
                .unwrap()
                .is_some());
        }
        assert!(KeyExchange::find_completed_between("s1", alice, carol, now, &db)
            .await
            .unwrap()
            .is_none());
    }
}
