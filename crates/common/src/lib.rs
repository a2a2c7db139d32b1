/**
 * Canonical identity type shared by every layer.
 *  Identities are compared structurally, never
 *  as loosely formatted strings.
 */
pub mod identity;
/**
 * Protocol types for the two-round key exchange.
 *  Round payloads are opaque to the relay: it
 *  stores and forwards them, it never verifies them.
 */
pub mod handshake;
/**
 * Pure anti-replay checks for message envelopes.
 *  Freshness, nonce reuse, sequence ordering
 *  and payload shape.
 */
pub mod replay;

pub mod prelude {
    pub use crate::handshake::{InitiatorRound, ResponderRound, SessionStatus};
    pub use crate::identity::{UserId, UserIdError};
    pub use crate::replay::{
        Candidate, ReplayGuard, ReplayViolation, SequenceGap, StreamState, Verdict,
    };
}
