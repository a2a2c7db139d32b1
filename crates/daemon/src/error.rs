use std::fmt;

use serde::{Deserialize, Serialize};

use common::prelude::ReplayViolation;

use crate::identity::IdentityError;

/// Coarse grouping of rejections, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    Authentication,
    Authorization,
    Replay,
    NotFound,
    Conflict,
    Precondition,
    Transient,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authentication => "authentication",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Replay => "replay",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Precondition => "precondition",
            ErrorCategory::Transient => "transient",
        };
        f.write_str(name)
    }
}

/// Every way a relay operation can be refused.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("a non-negative sequence number is required")]
    InvalidSequence,
    #[error("cannot initiate a key exchange with yourself")]
    SelfExchange,
    #[error("cannot send a message to yourself")]
    SelfMessage,

    #[error("authentication required")]
    Unauthenticated,

    #[error("not authorized to respond to this key exchange")]
    UnauthorizedResponder,
    #[error("not authorized to view this key exchange")]
    Forbidden,
    #[error("no completed key exchange with this user for the session")]
    NoAuthorizedSession,

    #[error(transparent)]
    Replay(#[from] ReplayViolation),

    #[error("target user not found")]
    PeerNotFound,
    #[error("receiver not found")]
    ReceiverNotFound,
    #[error("key exchange session not found")]
    SessionNotFound,

    #[error("session id already in use")]
    DuplicateSession,
    #[error("key exchange is no longer pending")]
    SessionAlreadyCompleted,

    #[error("target user has not published encryption keys")]
    PeerKeysNotProvisioned,
    #[error("you must publish encryption keys first")]
    CallerKeysNotProvisioned,

    #[error("identity service unavailable: {0}")]
    IdentityUnavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RelayError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MissingFields(_) => "MISSING_FIELDS",
            RelayError::MalformedRequest(_) => "MALFORMED_REQUEST",
            RelayError::InvalidSequence => "INVALID_SEQUENCE",
            RelayError::SelfExchange => "SELF_EXCHANGE",
            RelayError::SelfMessage => "SELF_MESSAGE_ATTEMPT",
            RelayError::Unauthenticated => "UNAUTHENTICATED",
            RelayError::UnauthorizedResponder => "UNAUTHORIZED_RESPONDER",
            RelayError::Forbidden => "FORBIDDEN",
            RelayError::NoAuthorizedSession => "NO_VALID_KEY_EXCHANGE",
            RelayError::Replay(violation) => match violation {
                ReplayViolation::TimestampTooOld { .. } => "TIMESTAMP_TOO_OLD",
                ReplayViolation::TimestampInFuture { .. } => "TIMESTAMP_IN_FUTURE",
                ReplayViolation::NonceReused => "REPLAY_ATTACK_NONCE",
                ReplayViolation::SequenceNotIncreasing { .. } => "REPLAY_ATTACK_SEQUENCE",
                ReplayViolation::MalformedPayload { .. } => "INVALID_CIPHERTEXT",
            },
            RelayError::PeerNotFound => "USER_NOT_FOUND",
            RelayError::ReceiverNotFound => "RECEIVER_NOT_FOUND",
            RelayError::SessionNotFound => "SESSION_NOT_FOUND",
            RelayError::DuplicateSession => "DUPLICATE_SESSION",
            RelayError::SessionAlreadyCompleted => "SESSION_ALREADY_COMPLETED",
            RelayError::PeerKeysNotProvisioned => "NO_KEYS_GENERATED",
            RelayError::CallerKeysNotProvisioned => "NO_OWN_KEYS",
            RelayError::IdentityUnavailable(_) => "SERVICE_UNAVAILABLE",
            RelayError::Database(_) => "SERVER_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::MissingFields(_)
            | RelayError::MalformedRequest(_)
            | RelayError::InvalidSequence
            | RelayError::SelfExchange
            | RelayError::SelfMessage => ErrorCategory::Validation,
            RelayError::Unauthenticated => ErrorCategory::Authentication,
            RelayError::UnauthorizedResponder
            | RelayError::Forbidden
            | RelayError::NoAuthorizedSession => ErrorCategory::Authorization,
            RelayError::Replay(ReplayViolation::MalformedPayload { .. }) => {
                ErrorCategory::Validation
            }
            RelayError::Replay(_) => ErrorCategory::Replay,
            RelayError::PeerNotFound
            | RelayError::ReceiverNotFound
            | RelayError::SessionNotFound => ErrorCategory::NotFound,
            RelayError::DuplicateSession | RelayError::SessionAlreadyCompleted => {
                ErrorCategory::Conflict
            }
            RelayError::PeerKeysNotProvisioned | RelayError::CallerKeysNotProvisioned => {
                ErrorCategory::Precondition
            }
            RelayError::IdentityUnavailable(_) | RelayError::Database(_) => {
                ErrorCategory::Transient
            }
        }
    }

    /// Text safe to hand back to any client.
    ///
    /// Replay rejections never echo the stored state that tripped them, and
    /// server-side failures never leak their cause.
    pub fn public_message(&self) -> String {
        match self {
            RelayError::Replay(ReplayViolation::TimestampTooOld { .. }) => {
                "message timestamp too old".to_string()
            }
            RelayError::Replay(ReplayViolation::TimestampInFuture { .. }) => {
                "message timestamp is in the future".to_string()
            }
            RelayError::Replay(ReplayViolation::NonceReused) => {
                "replay detected: nonce already used".to_string()
            }
            RelayError::Replay(ReplayViolation::SequenceNotIncreasing { .. }) => {
                "replay detected: sequence number not increasing".to_string()
            }
            RelayError::Replay(ReplayViolation::MalformedPayload { .. }) => {
                "invalid ciphertext".to_string()
            }
            RelayError::IdentityUnavailable(_) => "identity service unavailable".to_string(),
            RelayError::Database(_) => "internal server error".to_string(),
            other => other.to_string(),
        }
    }

    /// Emit the rejection at the level its category calls for
    pub fn trace(&self, operation: &'static str) {
        let code = self.code();
        match self.category() {
            ErrorCategory::Replay => {
                tracing::error!(operation, code, reason = %self, "security: replay rejected")
            }
            ErrorCategory::Transient => {
                tracing::error!(operation, code, error = %self, "operation failed")
            }
            _ => tracing::warn!(operation, code, reason = %self, "operation rejected"),
        }
    }

    /// Transient failures that a retry might clear
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::IdentityUnavailable(_) => true,
            RelayError::Database(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

impl From<IdentityError> for RelayError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => RelayError::Unauthenticated,
            IdentityError::Unavailable(reason) => RelayError::IdentityUnavailable(reason),
        }
    }
}

/// Accumulates absent request fields so a single rejection names all of them.
#[derive(Debug, Default)]
pub(crate) struct RequiredFields {
    missing: Vec<&'static str>,
}

impl RequiredFields {
    pub fn text(&mut self, name: &'static str, value: Option<String>) -> String {
        match value {
            Some(value) if !value.is_empty() => value,
            _ => {
                self.missing.push(name);
                String::new()
            }
        }
    }

    pub fn number(&mut self, name: &'static str, value: Option<i64>) -> i64 {
        value.unwrap_or_else(|| {
            self.missing.push(name);
            0
        })
    }

    pub fn finish(self) -> Result<(), RelayError> {
        if self.missing.is_empty() {
            Ok(())
        } else {
            Err(RelayError::MissingFields(self.missing))
        }
    }
}
