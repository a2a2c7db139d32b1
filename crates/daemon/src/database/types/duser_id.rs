use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::prelude::{UserId, UserIdError};

use super::text_column;

/// [`UserId`] stored as its canonical hyphenated text
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash)]
#[serde(transparent)]
pub struct DUserId(UserId);

impl From<DUserId> for UserId {
    fn from(val: DUserId) -> Self {
        val.0
    }
}

impl From<UserId> for DUserId {
    fn from(id: UserId) -> Self {
        Self(id)
    }
}

impl std::ops::Deref for DUserId {
    type Target = UserId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl PartialEq<UserId> for DUserId {
    fn eq(&self, other: &UserId) -> bool {
        self.0 == *other
    }
}

impl FromStr for DUserId {
    type Err = UserIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for DUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

text_column!(DUserId);
