//! Brokers the two-round authenticated key exchange.
//!
//! The coordinator never derives secrets. It records each side's signed
//! round, makes sure only the addressed responder can complete an
//! exchange, and exposes exchange state to the two participants.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use common::prelude::{InitiatorRound, ResponderRound, SessionStatus, UserId};

use crate::database::models::{KeyExchange, NewKeyExchange};
use crate::database::{unique_violation, Database};
use crate::error::{RelayError, RequiredFields};
use crate::identity::{lookup_profiles, DynIdentityGateway, Participant, UserProfile};

/// Most recent exchanges returned by a history listing
pub const HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub peer_id: Option<String>,
    pub session_id: Option<String>,
    pub ecdh_public_key: Option<String>,
    pub challenge: Option<String>,
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondRequest {
    pub session_id: Option<String>,
    pub ecdh_public_key: Option<String>,
    pub challenge_response: Option<String>,
    pub timestamp: Option<i64>,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedExchange {
    pub session_id: String,
    pub status: SessionStatus,
    pub initiator: Participant,
    pub responder: Participant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedExchange {
    pub session_id: String,
    pub status: SessionStatus,
}

/// An exchange waiting on the caller, with everything needed to verify
/// the initiator's round and answer it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingExchange {
    pub session_id: String,
    pub initiator: Participant,
    pub initiator_signing_public_key: Option<String>,
    #[serde(flatten)]
    pub round: InitiatorRound,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderReply {
    pub responder_id: UserId,
    pub responder_signing_public_key: Option<String>,
    #[serde(flatten)]
    pub round: ResponderRound,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeStatus {
    pub session_id: String,
    pub status: SessionStatus,
    /// Present once the exchange is completed
    pub reply: Option<ResponderReply>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSummary {
    pub session_id: String,
    pub initiator: Participant,
    pub responder: Participant,
    pub status: SessionStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub initiated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct HandshakeCoordinator {
    db: Database,
    identity: DynIdentityGateway,
}

impl HandshakeCoordinator {
    pub fn new(db: Database, identity: DynIdentityGateway) -> Self {
        Self { db, identity }
    }

    /// Open a pending exchange from `caller` to the requested peer.
    ///
    /// The caller's own exchange keys are checked before the peer's, so a
    /// caller without keys learns nothing about whether the peer has any.
    pub async fn initiate(
        &self,
        caller: UserId,
        request: InitiateRequest,
        now: OffsetDateTime,
    ) -> Result<InitiatedExchange, RelayError> {
        self.try_initiate(caller, request, now)
            .await
            .inspect_err(|e| e.trace("initiate"))
    }

    async fn try_initiate(
        &self,
        caller: UserId,
        request: InitiateRequest,
        now: OffsetDateTime,
    ) -> Result<InitiatedExchange, RelayError> {
        let mut fields = RequiredFields::default();
        let peer_id = fields.text("peerId", request.peer_id);
        let session_id = fields.text("sessionId", request.session_id);
        let round = InitiatorRound {
            ecdh_public_key: fields.text("ecdhPublicKey", request.ecdh_public_key),
            challenge: fields.text("challenge", request.challenge),
            timestamp: fields.number("timestamp", request.timestamp),
            signature: fields.text("signature", request.signature),
        };
        fields.finish()?;

        let peer: UserId = peer_id.parse().map_err(|_| RelayError::PeerNotFound)?;
        if peer == caller {
            return Err(RelayError::SelfExchange);
        }

        let peer_profile = self
            .identity
            .lookup_user(&peer)
            .await?
            .ok_or(RelayError::PeerNotFound)?;
        let caller_profile = self.identity.lookup_user(&caller).await?;

        match caller_profile.as_ref() {
            Some(profile) if profile.has_exchange_keys() => {}
            _ => return Err(RelayError::CallerKeysNotProvisioned),
        }
        if !peer_profile.has_exchange_keys() {
            return Err(RelayError::PeerKeysNotProvisioned);
        }

        let new = NewKeyExchange {
            session_id: &session_id,
            initiator_id: caller,
            responder_id: peer,
            round: &round,
        };
        let session = KeyExchange::create(new, now, &self.db)
            .await
            .map_err(|err| match unique_violation(&err) {
                Some(_) => RelayError::DuplicateSession,
                None => RelayError::Database(err),
            })?;

        tracing::info!(
            session_id = %session.session_id,
            initiator = %caller,
            responder = %peer,
            "key exchange initiated"
        );

        Ok(InitiatedExchange {
            session_id: session.session_id,
            status: *session.status,
            initiator: Participant {
                id: caller,
                display_name: caller_profile.map(|p| p.display_name),
            },
            responder: Participant {
                id: peer,
                display_name: Some(peer_profile.display_name),
            },
        })
    }

    /// Complete a pending exchange with the responder's round
    pub async fn respond(
        &self,
        caller: UserId,
        request: RespondRequest,
        now: OffsetDateTime,
    ) -> Result<CompletedExchange, RelayError> {
        self.try_respond(caller, request, now)
            .await
            .inspect_err(|e| e.trace("respond"))
    }

    async fn try_respond(
        &self,
        caller: UserId,
        request: RespondRequest,
        now: OffsetDateTime,
    ) -> Result<CompletedExchange, RelayError> {
        let mut fields = RequiredFields::default();
        let session_id = fields.text("sessionId", request.session_id);
        let round = ResponderRound {
            ecdh_public_key: fields.text("ecdhPublicKey", request.ecdh_public_key),
            challenge_response: fields.text("challengeResponse", request.challenge_response),
            timestamp: fields.number("timestamp", request.timestamp),
            signature: fields.text("signature", request.signature),
        };
        fields.finish()?;

        let applied = KeyExchange::complete(&session_id, caller, &round, now, &self.db).await?;
        if !applied {
            // The update is authoritative; this read only explains the miss.
            let session = KeyExchange::get(&session_id, now, &self.db)
                .await?
                .ok_or(RelayError::SessionNotFound)?;
            if session.responder_id != caller {
                return Err(RelayError::UnauthorizedResponder);
            }
            if !session.status.can_transition_to(SessionStatus::Completed) {
                return Err(RelayError::SessionAlreadyCompleted);
            }
            // still pending and addressed to the caller: it expired between
            // the update and the re-read
            return Err(RelayError::SessionNotFound);
        }

        tracing::info!(session_id = %session_id, responder = %caller, "key exchange completed");

        Ok(CompletedExchange {
            session_id,
            status: SessionStatus::Completed,
        })
    }

    /// Exchanges waiting on `caller` to respond, newest first
    pub async fn pending(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<PendingExchange>, RelayError> {
        self.try_pending(caller, now)
            .await
            .inspect_err(|e| e.trace("pending"))
    }

    async fn try_pending(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<PendingExchange>, RelayError> {
        let sessions = KeyExchange::pending_for(caller, now, &self.db).await?;

        let profiles = self
            .profiles(sessions.iter().map(|s| *s.initiator_id))
            .await?;

        Ok(sessions
            .into_iter()
            .map(|session| {
                let initiator = *session.initiator_id;
                PendingExchange {
                    session_id: session.session_id,
                    initiator_signing_public_key: profiles
                        .get(&initiator)
                        .and_then(|p| p.signing_public_key.clone()),
                    initiator: Participant::resolve(initiator, &profiles),
                    round: session.initiator_round,
                    initiated_at: *session.initiated_at,
                }
            })
            .collect())
    }

    pub async fn status(
        &self,
        caller: UserId,
        session_id: &str,
        now: OffsetDateTime,
    ) -> Result<ExchangeStatus, RelayError> {
        self.try_status(caller, session_id, now)
            .await
            .inspect_err(|e| e.trace("status"))
    }

    async fn try_status(
        &self,
        caller: UserId,
        session_id: &str,
        now: OffsetDateTime,
    ) -> Result<ExchangeStatus, RelayError> {
        let session = KeyExchange::get(session_id, now, &self.db)
            .await?
            .ok_or(RelayError::SessionNotFound)?;
        if !session.involves(caller) {
            return Err(RelayError::Forbidden);
        }

        let reply = match (*session.status, session.responder_round) {
            (SessionStatus::Completed, Some(round)) => {
                let responder_id = *session.responder_id;
                let responder_signing_public_key = self
                    .identity
                    .lookup_user(&responder_id)
                    .await?
                    .and_then(|p| p.signing_public_key);
                Some(ResponderReply {
                    responder_id,
                    responder_signing_public_key,
                    round,
                })
            }
            _ => None,
        };

        Ok(ExchangeStatus {
            session_id: session.session_id,
            status: *session.status,
            reply,
        })
    }

    /// Recent exchanges the caller took part in, newest first
    pub async fn history(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<ExchangeSummary>, RelayError> {
        self.try_history(caller, now)
            .await
            .inspect_err(|e| e.trace("history"))
    }

    async fn try_history(
        &self,
        caller: UserId,
        now: OffsetDateTime,
    ) -> Result<Vec<ExchangeSummary>, RelayError> {
        let sessions = KeyExchange::history_for(caller, HISTORY_LIMIT, now, &self.db).await?;

        let profiles = self
            .profiles(
                sessions
                    .iter()
                    .flat_map(|s| [*s.initiator_id, *s.responder_id]),
            )
            .await?;

        Ok(sessions
            .into_iter()
            .map(|session| ExchangeSummary {
                initiator: Participant::resolve(*session.initiator_id, &profiles),
                responder: Participant::resolve(*session.responder_id, &profiles),
                session_id: session.session_id,
                status: *session.status,
                initiated_at: *session.initiated_at,
                completed_at: session.completed_at.map(Into::into),
            })
            .collect())
    }

    async fn profiles(
        &self,
        ids: impl IntoIterator<Item = UserId>,
    ) -> Result<HashMap<UserId, UserProfile>, RelayError> {
        lookup_profiles(self.identity.as_ref(), ids)
            .await
            .map_err(RelayError::from)
    }
}
