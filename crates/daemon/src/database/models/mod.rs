mod envelope;
mod key_exchange;

pub use envelope::{AppendOutcome, Envelope, NewEnvelope, ENVELOPE_TTL};
pub use key_exchange::{KeyExchange, NewKeyExchange, SESSION_TTL};
