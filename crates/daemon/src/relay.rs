//! Accepts, stores and serves encrypted envelopes.
//!
//! An envelope is only accepted on a completed exchange between exactly its
//! sender and receiver, and only after the replay guard has passed it. The
//! store repeats the nonce and ordering checks inside the insert itself, so
//! racing senders cannot slip a duplicate past the guard.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use common::prelude::{Candidate, ReplayGuard, ReplayViolation, StreamState, UserId};

use crate::database::models::{AppendOutcome, Envelope, KeyExchange, NewEnvelope};
use crate::database::types::{unix_millis, MessageId};
use crate::database::Database;
use crate::error::{RelayError, RequiredFields};
use crate::identity::{lookup_profiles, DynIdentityGateway, Participant};

/// Most envelopes returned for one session
pub const SESSION_MESSAGES_LIMIT: i64 = 100;
/// Envelopes older than this are removed by a cleanup request
pub const MESSAGE_RETENTION: Duration = Duration::days(30);

/// Cutoff for a cleanup run at `now`
pub fn retention_cutoff(now: OffsetDateTime) -> OffsetDateTime {
    now - MESSAGE_RETENTION
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub session_id: Option<String>,
    pub receiver_id: Option<String>,
    pub ciphertext: Option<String>,
    pub iv: Option<String>,
    pub nonce: Option<String>,
    pub timestamp: Option<i64>,
    pub sequence_number: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentEnvelope {
    pub message_id: MessageId,
    pub sequence_number: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredEnvelope {
    pub message_id: MessageId,
    pub session_id: String,
    pub sender: Participant,
    pub receiver: Participant,
    pub ciphertext: String,
    pub iv: String,
    pub nonce: String,
    pub timestamp: i64,
    pub sequence_number: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub partner_id: UserId,
    pub partner_name: Option<String>,
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_message_at: OffsetDateTime,
}

#[derive(Clone)]
pub struct MessageRelay {
    db: Database,
    identity: DynIdentityGateway,
    guard: ReplayGuard,
}

impl MessageRelay {
    pub fn new(db: Database, identity: DynIdentityGateway, guard: ReplayGuard) -> Self {
        Self { db, identity, guard }
    }

    pub async fn send(
        &self,
        sender: UserId,
        request: SendRequest,
        now: OffsetDateTime,
    ) -> Result<SentEnvelope, RelayError> {
        self.try_send(sender, request, now)
            .await
            .inspect_err(|e| e.trace("send"))
    }

    async fn try_send(
        &self,
        sender: UserId,
        request: SendRequest,
        now: OffsetDateTime,
    ) -> Result<SentEnvelope, RelayError> {
        let mut fields = RequiredFields::default();
        let session_id = fields.text("sessionId", request.session_id);
        let receiver_id = fields.text("receiverId", request.receiver_id);
        let ciphertext = fields.text("ciphertext", request.ciphertext);
        let iv = fields.text("iv", request.iv);
        let nonce = fields.text("nonce", request.nonce);
        let timestamp = fields.number("timestamp", request.timestamp);
        fields.finish()?;

        let sequence_number = match request.sequence_number {
            Some(n) if n >= 0 => n,
            _ => return Err(RelayError::InvalidSequence),
        };

        let receiver: UserId = receiver_id
            .parse()
            .map_err(|_| RelayError::ReceiverNotFound)?;
        if receiver == sender {
            return Err(RelayError::SelfMessage);
        }
        if self.identity.lookup_user(&receiver).await?.is_none() {
            return Err(RelayError::ReceiverNotFound);
        }

        KeyExchange::find_completed_between(&session_id, sender, receiver, now, &self.db)
            .await?
            .ok_or(RelayError::NoAuthorizedSession)?;

        let stream = StreamState {
            nonce_seen: Envelope::nonce_exists(&nonce, &self.db).await?,
            last_sequence: Envelope::last_sequence(&session_id, sender, receiver, &self.db)
                .await?,
        };
        let candidate = Candidate {
            ciphertext: &ciphertext,
            timestamp,
            sequence_number,
        };
        let verdict = self.guard.check(&candidate, &stream, unix_millis(now))?;

        if let Some(gap) = verdict.gap {
            tracing::warn!(
                session_id = %session_id,
                sender = %sender,
                expected = gap.expected,
                received = gap.received,
                "sequence gap, messages may have been lost"
            );
        }

        let new = NewEnvelope {
            session_id: &session_id,
            sender_id: sender,
            receiver_id: receiver,
            ciphertext: &ciphertext,
            iv: &iv,
            nonce: &nonce,
            timestamp,
            sequence_number,
        };
        let envelope = match Envelope::append(new, now, &self.db).await? {
            AppendOutcome::Appended(envelope) => envelope,
            AppendOutcome::NonceTaken => return Err(ReplayViolation::NonceReused.into()),
            AppendOutcome::SequenceStale => {
                let last = Envelope::last_sequence(&session_id, sender, receiver, &self.db)
                    .await?
                    .unwrap_or(sequence_number);
                return Err(ReplayViolation::SequenceNotIncreasing {
                    last,
                    received: sequence_number,
                }
                .into());
            }
        };

        tracing::info!(
            message_id = %envelope.message_id,
            session_id = %session_id,
            sender = %sender,
            receiver = %receiver,
            sequence_number,
            "envelope accepted"
        );

        Ok(SentEnvelope {
            message_id: envelope.message_id,
            sequence_number: envelope.sequence_number,
            sent_at: *envelope.sent_at,
        })
    }

    /// Envelopes of one session the caller sent or received, oldest
    /// sequence first
    pub async fn session_messages(
        &self,
        caller: UserId,
        session_id: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        self.try_session_messages(caller, session_id, now)
            .await
            .inspect_err(|e| e.trace("session_messages"))
    }

    async fn try_session_messages(
        &self,
        caller: UserId,
        session_id: Option<String>,
        now: OffsetDateTime,
    ) -> Result<Vec<DeliveredEnvelope>, RelayError> {
        let mut fields = RequiredFields::default();
        let session_id = fields.text("sessionId", session_id);
        fields.finish()?;

        let envelopes =
            Envelope::for_session(&session_id, caller, SESSION_MESSAGES_LIMIT, now, &self.db)
                .await?;

        let profiles = lookup_profiles(
            self.identity.as_ref(),
            envelopes
                .iter()
                .flat_map(|e| [*e.sender_id, *e.receiver_id]),
        )
        .await?;

        Ok(envelopes
            .into_iter()
            .map(|envelope| DeliveredEnvelope {
                message_id: envelope.message_id,
                session_id: envelope.session_id,
                sender: Participant::resolve(*envelope.sender_id, &profiles),
                receiver: Participant::resolve(*envelope.receiver_id, &profiles),
                ciphertext: envelope.ciphertext,
                iv: envelope.iv,
                nonce: envelope.nonce,
                timestamp: envelope.timestamp,
                sequence_number: envelope.sequence_number,
                sent_at: *envelope.sent_at,
            })
            .collect())
    }

    /// One entry per conversation partner, most recently active first
    pub async fn conversations(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<Conversation>, RelayError> {
        self.try_conversations(caller, now)
            .await
            .inspect_err(|e| e.trace("conversations"))
    }

    async fn try_conversations(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<Conversation>, RelayError> {
        let envelopes = Envelope::for_participant(caller, now, &self.db).await?;

        let mut seen = HashSet::new();
        let latest: Vec<_> = envelopes
            .into_iter()
            .filter_map(|envelope| {
                let partner = if envelope.sender_id == caller {
                    *envelope.receiver_id
                } else {
                    *envelope.sender_id
                };
                seen.insert(partner).then_some((partner, envelope))
            })
            .collect();

        let profiles =
            lookup_profiles(self.identity.as_ref(), latest.iter().map(|(p, _)| *p)).await?;

        Ok(latest
            .into_iter()
            .map(|(partner, envelope)| Conversation {
                partner_id: partner,
                partner_name: profiles.get(&partner).map(|p| p.display_name.clone()),
                session_id: envelope.session_id,
                last_message_at: *envelope.sent_at,
            })
            .collect())
    }

    /// Delete every envelope sent before `cutoff`, returning how many went
    pub async fn cleanup(&self, cutoff: OffsetDateTime) -> Result<u64, RelayError> {
        let deleted = Envelope::delete_sent_before(cutoff, &self.db)
            .await
            .map_err(RelayError::from)
            .inspect_err(|e| e.trace("cleanup"))?;

        tracing::info!(deleted, cutoff = %cutoff, "cleaned up old envelopes");
        Ok(deleted)
    }
}
