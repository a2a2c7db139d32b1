use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::prelude::SessionStatus;

use super::text_column;

/// [`SessionStatus`] stored as its lowercase name
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash, Default)]
#[serde(transparent)]
pub struct DStatus(SessionStatus);

impl From<SessionStatus> for DStatus {
    fn from(status: SessionStatus) -> Self {
        Self(status)
    }
}

impl From<DStatus> for SessionStatus {
    fn from(val: DStatus) -> Self {
        val.0
    }
}

impl std::ops::Deref for DStatus {
    type Target = SessionStatus;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for DStatus {
    type Err = DStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::parse(s)
            .map(Self)
            .ok_or_else(|| DStatusError::Unknown(s.to_string()))
    }
}

impl fmt::Display for DStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

text_column!(DStatus);

#[derive(Debug, thiserror::Error)]
pub enum DStatusError {
    #[error("unknown session status: {0}")]
    Unknown(String),
}
