use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Duration, OffsetDateTime};

use common::prelude::UserId;

use crate::database::types::{DTimestamp, DUserId, MessageId};
use crate::database::{unique_violation, Database};

/// How long a relayed envelope is kept before the sweeper may drop it
pub const ENVELOPE_TTL: Duration = Duration::days(30);

/// An opaque encrypted message relayed between two session participants
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Envelope {
    pub message_id: MessageId,
    pub session_id: String,
    pub sender_id: DUserId,
    pub receiver_id: DUserId,
    pub ciphertext: String,
    pub iv: String,
    pub nonce: String,
    /// Client clock at send time, unix milliseconds
    pub timestamp: i64,
    pub sequence_number: i64,
    pub sent_at: DTimestamp,
    pub expires_at: DTimestamp,
}

#[derive(Debug, Clone, Copy)]
pub struct NewEnvelope<'a> {
    pub session_id: &'a str,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub ciphertext: &'a str,
    pub iv: &'a str,
    pub nonce: &'a str,
    pub timestamp: i64,
    pub sequence_number: i64,
}

#[derive(Debug)]
pub enum AppendOutcome {
    Appended(Envelope),
    /// Another stored envelope already carries the nonce
    NonceTaken,
    /// The stream already holds a sequence number at or above this one
    SequenceStale,
}

impl Envelope {
    /// Append to the end of a stream.
    ///
    /// The insert is conditional on the sequence number exceeding the
    /// stream's current maximum, evaluated inside the same statement, and the
    /// nonce index rejects reuse. Concurrent sends therefore cannot both land
    /// on the same nonce or on a non-increasing sequence.
    pub async fn append(
        new: NewEnvelope<'_>,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<AppendOutcome, sqlx::Error> {
        let message_id = MessageId::generate();

        let result = sqlx::query(
            r#"
            INSERT INTO envelopes (
                message_id, session_id, sender_id, receiver_id,
                ciphertext, iv, nonce, timestamp, sequence_number,
                sent_at, expires_at
            )
            SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
            WHERE ?9 > COALESCE(
                (SELECT MAX(sequence_number) FROM envelopes
                 WHERE session_id = ?2 AND sender_id = ?3 AND receiver_id = ?4),
                -1
            )
            "#,
        )
        .bind(message_id)
        .bind(new.session_id)
        .bind(DUserId::from(new.sender_id))
        .bind(DUserId::from(new.receiver_id))
        .bind(new.ciphertext)
        .bind(new.iv)
        .bind(new.nonce)
        .bind(new.timestamp)
        .bind(new.sequence_number)
        .bind(DTimestamp::from(now))
        .bind(DTimestamp::from(now + ENVELOPE_TTL))
        .execute(&**db)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Ok(AppendOutcome::SequenceStale),
            Ok(_) => Self::get(message_id, db)
                .await?
                .map(AppendOutcome::Appended)
                .ok_or(sqlx::Error::RowNotFound),
            Err(err) => match unique_violation(&err) {
                Some(message) if message.contains("envelopes.nonce") => {
                    Ok(AppendOutcome::NonceTaken)
                }
                Some(_) => Ok(AppendOutcome::SequenceStale),
                None => Err(err),
            },
        }
    }

    pub async fn get(message_id: MessageId, db: &Database) -> Result<Option<Envelope>, sqlx::Error> {
        sqlx::query_as::<_, Envelope>(
            r#"
            SELECT
                message_id, session_id, sender_id, receiver_id,
                ciphertext, iv, nonce, timestamp, sequence_number,
                sent_at, expires_at
            FROM envelopes
            WHERE message_id = ?1
            "#,
        )
        .bind(message_id)
        .fetch_optional(&**db)
        .await
    }

    pub async fn nonce_exists(nonce: &str, db: &Database) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM envelopes WHERE nonce = ?1")
            .bind(nonce)
            .fetch_optional(&**db)
            .await?;
        Ok(row.is_some())
    }

    /// Highest sequence number stored for the stream, if any
    pub async fn last_sequence(
        session_id: &str,
        sender_id: UserId,
        receiver_id: UserId,
        db: &Database,
    ) -> Result<Option<i64>, sqlx::Error> {
        let (last,): (Option<i64>,) = sqlx::query_as(
            r#"
            SELECT MAX(sequence_number) FROM envelopes
            WHERE session_id = ?1 AND sender_id = ?2 AND receiver_id = ?3
            "#,
        )
        .bind(session_id)
        .bind(DUserId::from(sender_id))
        .bind(DUserId::from(receiver_id))
        .fetch_one(&**db)
        .await?;
        Ok(last)
    }

    /// Unexpired envelopes of a session that `participant` sent or received,
    /// in ascending sequence order
    pub async fn for_session(
        session_id: &str,
        participant: UserId,
        limit: i64,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Vec<Envelope>, sqlx::Error> {
        sqlx::query_as::<_, Envelope>(
            r#"
            SELECT
                message_id, session_id, sender_id, receiver_id,
                ciphertext, iv, nonce, timestamp, sequence_number,
                sent_at, expires_at
            FROM envelopes
            WHERE session_id = ?1
              AND (sender_id = ?2 OR receiver_id = ?2)
              AND expires_at > ?3
            ORDER BY sequence_number ASC, sent_at ASC, rowid ASC
            LIMIT ?4
            "#,
        )
        .bind(session_id)
        .bind(DUserId::from(participant))
        .bind(DTimestamp::from(now))
        .bind(limit)
        .fetch_all(&**db)
        .await
    }

    /// Every unexpired envelope touching `participant`, most recent first
    pub async fn for_participant(
        participant: UserId,
        now: OffsetDateTime,
        db: &Database,
    ) -> Result<Vec<Envelope>, sqlx::Error> {
        sqlx::query_as::<_, Envelope>(
            r#"
            SELECT
                message_id, session_id, sender_id, receiver_id,
                ciphertext, iv, nonce, timestamp, sequence_number,
                sent_at, expires_at
            FROM envelopes
            WHERE (sender_id = ?1 OR receiver_id = ?1)
              AND expires_at > ?2
            ORDER BY sent_at DESC, rowid DESC
            "#,
        )
        .bind(DUserId::from(participant))
        .bind(DTimestamp::from(now))
        .fetch_all(&**db)
        .await
    }

    /// Drop every envelope sent strictly before `cutoff`
    pub async fn delete_sent_before(
        cutoff: OffsetDateTime,
        db: &Database,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM envelopes WHERE sent_at < ?1")
            .bind(DTimestamp::from(cutoff))
            .execute(&**db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_expired(now: OffsetDateTime, db: &Database) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM envelopes WHERE expires_at <= ?1")
            .bind(DTimestamp::from(now))
            .execute(&**db)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope<'a>(
        session_id: &'a str,
        from: UserId,
        to: UserId,
        nonce: &'a str,
        sequence_number: i64,
    ) -> NewEnvelope<'a> {
        NewEnvelope {
            session_id,
            sender_id: from,
            receiver_id: to,
            ciphertext: "Y2lwaGVydGV4dC1wYXlsb2Fk",
            iv: "aXY=",
            nonce,
            timestamp: 0,
            sequence_number,
        }
    }

    #[tokio::test]
    async fn test_append_enforces_nonce_and_sequence() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        let first = Envelope::append(envelope("s1", alice, bob, "n1", 0), now, &db)
            .await
            .unwrap();
        let AppendOutcome::Appended(stored) = first else {
            panic!("expected first envelope to be stored");
        };
        assert_eq!(stored.sequence_number, 0);
        assert_eq!(*stored.expires_at - *stored.sent_at, ENVELOPE_TTL);

        assert!(matches!(
            Envelope::append(envelope("s1", alice, bob, "n1", 1), now, &db).await.unwrap(),
            AppendOutcome::NonceTaken
        ));
        assert!(matches!(
            Envelope::append(envelope("s1", alice, bob, "n2", 0), now, &db).await.unwrap(),
            AppendOutcome::SequenceStale
        ));

        // the reverse direction is its own stream
        assert!(matches!(
            Envelope::append(envelope("s1", bob, alice, "n3", 0), now, &db).await.unwrap(),
            AppendOutcome::Appended(_)
        ));

        assert!(Envelope::nonce_exists("n1", &db).await.unwrap());
        assert!(!Envelope::nonce_exists("n2", &db).await.unwrap());
        assert_eq!(
            Envelope::last_sequence("s1", alice, bob, &db).await.unwrap(),
            Some(0)
        );
        assert_eq!(
            Envelope::last_sequence("s2", alice, bob, &db).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_retention_and_expiry_deletes() {
        let db = Database::in_memory().await.unwrap();
        let now = OffsetDateTime::now_utc();
        let (alice, bob) = (UserId::generate(), UserId::generate());

        Envelope::append(envelope("s1", alice, bob, "old", 0), now - Duration::days(31), &db)
            .await
            .unwrap();
        Envelope::append(envelope("s1", alice, bob, "new", 1), now - Duration::days(10), &db)
            .await
            .unwrap();

        // the 31 day old envelope is already past its expiry
        assert_eq!(
            Envelope::for_participant(bob, now, &db).await.unwrap().len(),
            1
        );

        let removed = Envelope::delete_sent_before(now - Duration::days(30), &db)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(Envelope::delete_expired(now, &db).await.unwrap(), 0);
        assert!(Envelope::nonce_exists("new", &db).await.unwrap());
    }
}
