//! # Handshake rounds
//!
//! The key exchange runs in two rounds correlated by a client-chosen
//! session id:
//!
//! 1. the **initiator** publishes an ephemeral ECDH public key, a challenge
//!    and a signature over them;
//! 2. the **responder** answers with its own ephemeral key, a response to the
//!    challenge and a signature.
//!
//! Both parties derive the shared secret locally. The relay stores the
//! rounds verbatim and hands round 2 back to the initiator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Round 1 payload, published by the initiator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatorRound {
    pub ecdh_public_key: String,
    pub challenge: String,
    /// Client clock, unix milliseconds
    pub timestamp: i64,
    pub signature: String,
}

/// Round 2 payload, published by the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponderRound {
    pub ecdh_public_key: String,
    pub challenge_response: String,
    /// Client clock, unix milliseconds
    pub timestamp: i64,
    pub signature: String,
}

/// Lifecycle of a key-exchange session.
///
/// Transitions only move forward: `Pending -> Completed`. `Failed` is part
/// of the taxonomy so stored rows and clients can name it, but no relay
/// operation moves a session into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Pending, SessionStatus::Completed)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("done"), None);
    }

    #[test]
    fn test_only_pending_to_completed() {
        use SessionStatus::*;

        assert!(Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_round_wire_names() {
        let round = ResponderRound {
            ecdh_public_key: "pk".into(),
            challenge_response: "resp".into(),
            timestamp: 1_700_000_000_000,
            signature: "sig".into(),
        };
        let value = serde_json::to_value(&round).unwrap();
        assert_eq!(value["ecdhPublicKey"], "pk");
        assert_eq!(value["challengeResponse"], "resp");
        assert_eq!(value["timestamp"], 1_700_000_000_000i64);
    }
}
