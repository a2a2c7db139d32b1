use serde::{Deserialize, Serialize};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef};
use sqlx::{Decode, Encode, Sqlite, Type};
use time::OffsetDateTime;

/// Milliseconds since the unix epoch
pub fn unix_millis(at: OffsetDateTime) -> i64 {
    (at.unix_timestamp_nanos() / 1_000_000) as i64
}

pub fn from_unix_millis(ms: i64) -> Result<OffsetDateTime, time::error::ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
}

/// UTC instant stored as INTEGER unix milliseconds.
///
/// Conversion truncates to the millisecond so a value compares equal to
/// itself after a trip through the database.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct DTimestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl DTimestamp {
    pub fn as_millis(&self) -> i64 {
        unix_millis(self.0)
    }
}

impl From<OffsetDateTime> for DTimestamp {
    fn from(at: OffsetDateTime) -> Self {
        let at = at.to_offset(time::UtcOffset::UTC);
        let truncated = at
            .replace_nanosecond(at.millisecond() as u32 * 1_000_000)
            .unwrap_or(at);
        Self(truncated)
    }
}

impl From<DTimestamp> for OffsetDateTime {
    fn from(val: DTimestamp) -> Self {
        val.0
    }
}

impl std::ops::Deref for DTimestamp {
    type Target = OffsetDateTime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Decode<'_, Sqlite> for DTimestamp {
    fn decode(value: SqliteValueRef<'_>) -> Result<Self, BoxDynError> {
        let ms = <i64 as Decode<Sqlite>>::decode(value)?;
        Ok(Self(from_unix_millis(ms)?))
    }
}

impl<'q> Encode<'q, Sqlite> for DTimestamp {
    fn encode_by_ref(
        &self,
        args: &mut Vec<SqliteArgumentValue<'q>>,
    ) -> Result<IsNull, BoxDynError> {
        args.push(SqliteArgumentValue::Int64(self.as_millis()));
        Ok(IsNull::No)
    }
}

impl Type<Sqlite> for DTimestamp {
    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <i64 as Type<Sqlite>>::compatible(ty)
    }

    fn type_info() -> SqliteTypeInfo {
        <i64 as Type<Sqlite>>::type_info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_millis_conversions() {
        let at = datetime!(2025-10-16 00:00:01.5 UTC);
        assert_eq!(unix_millis(at), 1_760_572_801_500);
        assert_eq!(from_unix_millis(1_760_572_801_500).unwrap(), at);
    }

    #[test]
    fn test_serializes_as_rfc3339() {
        let at = DTimestamp::from(datetime!(2025-10-16 08:00:00 +02:00));
        let json = serde_json::to_string(&at).unwrap();
        assert_eq!(json, "\"2025-10-16T06:00:00Z\"");
    }
}
