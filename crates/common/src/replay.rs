//! # Replay guard
//!
//! Decides whether a candidate envelope may be accepted onto its stream.
//! A stream is the ordered flow of envelopes for one
//! `(session, sender, receiver)` triple.
//!
//! The guard is pure: the caller reads the stream's current state from the
//! store, asks the guard, and only then writes. The store still carries its
//! own uniqueness and ordering constraints; the guard is what produces the
//! precise rejection kind in the uncontended case.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. timestamp freshness
//! 2. nonce reuse
//! 3. sequence monotonicity
//! 4. payload shape

/// Oldest acceptable client timestamp, relative to server time.
pub const MAX_MESSAGE_AGE_MS: i64 = 5 * 60 * 1000;
/// Allowed client clock lead over server time.
pub const MAX_CLOCK_SKEW_MS: i64 = 60 * 1000;
/// Sequence jumps beyond the expected value plus this are reported.
pub const SEQUENCE_GAP_TOLERANCE: i64 = 10;
/// Shortest ciphertext that is not considered degenerate.
pub const MIN_CIPHERTEXT_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayViolation {
    #[error("message timestamp too old ({age_ms} ms)")]
    TimestampTooOld { age_ms: i64 },
    #[error("message timestamp is {ahead_ms} ms in the future")]
    TimestampInFuture { ahead_ms: i64 },
    #[error("nonce already used")]
    NonceReused,
    #[error("sequence number {received} does not exceed {last}")]
    SequenceNotIncreasing { last: i64, received: i64 },
    #[error("ciphertext too short ({len} < {min})")]
    MalformedPayload { len: usize, min: usize },
}

/// The parts of an envelope the guard looks at.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub ciphertext: &'a str,
    /// Client clock, unix milliseconds
    pub timestamp: i64,
    pub sequence_number: i64,
}

/// What the store currently holds for the candidate's stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamState {
    /// Some stored envelope, on any stream, already carries this nonce
    pub nonce_seen: bool,
    /// Highest accepted sequence number on this exact stream
    pub last_sequence: Option<i64>,
}

/// A tolerated forward jump in sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    pub expected: i64,
    pub received: i64,
}

/// Outcome of an accepted check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verdict {
    pub gap: Option<SequenceGap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayGuard {
    pub max_age_ms: i64,
    pub max_skew_ms: i64,
    pub gap_tolerance: i64,
    pub min_ciphertext_len: usize,
}

impl Default for ReplayGuard {
    fn default() -> Self {
        Self {
            max_age_ms: MAX_MESSAGE_AGE_MS,
            max_skew_ms: MAX_CLOCK_SKEW_MS,
            gap_tolerance: SEQUENCE_GAP_TOLERANCE,
            min_ciphertext_len: MIN_CIPHERTEXT_LEN,
        }
    }
}

impl ReplayGuard {
    pub fn check(
        &self,
        candidate: &Candidate<'_>,
        stream: &StreamState,
        now_ms: i64,
    ) -> Result<Verdict, ReplayViolation> {
        self.check_freshness(candidate.timestamp, now_ms)?;

        if stream.nonce_seen {
            return Err(ReplayViolation::NonceReused);
        }

        let gap = self.check_sequence(candidate.sequence_number, stream.last_sequence)?;

        let len = candidate.ciphertext.chars().count();
        if len < self.min_ciphertext_len {
            return Err(ReplayViolation::MalformedPayload {
                len,
                min: self.min_ciphertext_len,
            });
        }

        Ok(Verdict { gap })
    }

    fn check_freshness(&self, timestamp: i64, now_ms: i64) -> Result<(), ReplayViolation> {
        let age_ms = now_ms.saturating_sub(timestamp);
        if age_ms > self.max_age_ms {
            return Err(ReplayViolation::TimestampTooOld { age_ms });
        }
        if timestamp > now_ms.saturating_add(self.max_skew_ms) {
            return Err(ReplayViolation::TimestampInFuture {
                ahead_ms: timestamp.saturating_sub(now_ms),
            });
        }
        Ok(())
    }

    fn check_sequence(
        &self,
        received: i64,
        last: Option<i64>,
    ) -> Result<Option<SequenceGap>, ReplayViolation> {
        let Some(last) = last else {
            return Ok(None);
        };

        if received <= last {
            return Err(ReplayViolation::SequenceNotIncreasing { last, received });
        }

        let expected = last.saturating_add(1);
        if received > expected.saturating_add(self.gap_tolerance) {
            return Ok(Some(SequenceGap { expected, received }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;
    const CIPHERTEXT: &str = "c2VhbGVkLWVudmVsb3BlLWJvZHk=";

    fn candidate(timestamp: i64, sequence_number: i64) -> Candidate<'static> {
        Candidate {
            ciphertext: CIPHERTEXT,
            timestamp,
            sequence_number,
        }
    }

    #[test]
    fn test_fresh_first_message_accepted() {
        let guard = ReplayGuard::default();
        let verdict = guard
            .check(&candidate(NOW, 0), &StreamState::default(), NOW)
            .unwrap();
        assert_eq!(verdict, Verdict::default());
    }

    #[test]
    fn test_freshness_window() {
        let guard = ReplayGuard::default();
        let stream = StreamState::default();

        let ten_minutes_ago = NOW - 10 * 60 * 1000;
        assert!(matches!(
            guard.check(&candidate(ten_minutes_ago, 0), &stream, NOW),
            Err(ReplayViolation::TimestampTooOld { .. })
        ));

        let thirty_seconds_ahead = NOW + 30 * 1000;
        assert!(guard
            .check(&candidate(thirty_seconds_ahead, 0), &stream, NOW)
            .is_ok());

        let two_minutes_ahead = NOW + 2 * 60 * 1000;
        assert_eq!(
            guard.check(&candidate(two_minutes_ahead, 0), &stream, NOW),
            Err(ReplayViolation::TimestampInFuture {
                ahead_ms: 2 * 60 * 1000
            })
        );

        // boundaries are inclusive
        assert!(guard
            .check(&candidate(NOW - MAX_MESSAGE_AGE_MS, 0), &stream, NOW)
            .is_ok());
        assert!(guard
            .check(&candidate(NOW + MAX_CLOCK_SKEW_MS, 0), &stream, NOW)
            .is_ok());
    }

    #[test]
    fn test_nonce_reuse_wins_over_sequence() {
        let guard = ReplayGuard::default();
        let stream = StreamState {
            nonce_seen: true,
            last_sequence: Some(0),
        };
        assert_eq!(
            guard.check(&candidate(NOW, 0), &stream, NOW),
            Err(ReplayViolation::NonceReused)
        );
    }

    #[test]
    fn test_sequence_must_strictly_increase() {
        let guard = ReplayGuard::default();
        let stream = StreamState {
            nonce_seen: false,
            last_sequence: Some(4),
        };

        assert_eq!(
            guard.check(&candidate(NOW, 4), &stream, NOW),
            Err(ReplayViolation::SequenceNotIncreasing {
                last: 4,
                received: 4
            })
        );
        assert!(guard.check(&candidate(NOW, 2), &stream, NOW).is_err());
        assert!(guard.check(&candidate(NOW, 5), &stream, NOW).is_ok());
    }

    #[test]
    fn test_large_gap_is_a_warning_not_a_rejection() {
        let guard = ReplayGuard::default();
        let stream = StreamState {
            nonce_seen: false,
            last_sequence: Some(1),
        };

        // expected 2, tolerance 10: 12 is fine, 13 is reported
        let verdict = guard.check(&candidate(NOW, 12), &stream, NOW).unwrap();
        assert_eq!(verdict.gap, None);

        let verdict = guard.check(&candidate(NOW, 13), &stream, NOW).unwrap();
        assert_eq!(
            verdict.gap,
            Some(SequenceGap {
                expected: 2,
                received: 13
            })
        );
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let guard = ReplayGuard::default();
        let short = Candidate {
            ciphertext: "too-short",
            timestamp: NOW,
            sequence_number: 0,
        };
        assert_eq!(
            guard.check(&short, &StreamState::default(), NOW),
            Err(ReplayViolation::MalformedPayload { len: 9, min: 16 })
        );
    }
}
