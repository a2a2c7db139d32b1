mod dstatus;
mod dtimestamp;
mod duser_id;
mod message_id;

pub use dstatus::DStatus;
pub use dtimestamp::{from_unix_millis, unix_millis, DTimestamp};
pub use duser_id::DUserId;
pub use message_id::MessageId;

/// Implements the sqlx codec for a wrapper stored as TEXT through its
/// `Display` and `FromStr` impls.
macro_rules! text_column {
    ($wrapper:ty) => {
        impl sqlx::Decode<'_, sqlx::Sqlite> for $wrapper {
            fn decode(
                value: sqlx::sqlite::SqliteValueRef<'_>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
                Ok(s.parse::<$wrapper>()?)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for $wrapper {
            fn encode_by_ref(
                &self,
                args: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                args.push(sqlx::sqlite::SqliteArgumentValue::Text(
                    self.to_string().into(),
                ));
                Ok(sqlx::encode::IsNull::No)
            }
        }

        impl sqlx::Type<sqlx::Sqlite> for $wrapper {
            fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
            }

            fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
                <String as sqlx::Type<sqlx::Sqlite>>::type_info()
            }
        }
    };
}

pub(crate) use text_column;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use common::prelude::{SessionStatus, UserId};
    use time::macros::datetime;

    #[tokio::test]
    async fn test_columns_survive_the_database() {
        let db = Database::in_memory().await.unwrap();

        let user = DUserId::from(UserId::generate());
        let message = MessageId::generate();
        let status = DStatus::from(SessionStatus::Completed);
        let at = DTimestamp::from(datetime!(2025-10-16 12:30:45.123456 UTC));

        let row: (DUserId, MessageId, DStatus, DTimestamp) =
            sqlx::query_as("SELECT ?1, ?2, ?3, ?4")
                .bind(user)
                .bind(message)
                .bind(status)
                .bind(at)
                .fetch_one(&*db)
                .await
                .unwrap();

        assert_eq!(row.0, user);
        assert_eq!(row.1, message);
        assert_eq!(*row.2, SessionStatus::Completed);
        // stored at millisecond precision
        assert_eq!(*row.3, datetime!(2025-10-16 12:30:45.123 UTC));
    }

    #[tokio::test]
    async fn test_garbage_text_fails_to_decode() {
        let db = Database::in_memory().await.unwrap();

        let result: Result<(DUserId,), _> = sqlx::query_as("SELECT 'not-a-user'")
            .fetch_one(&*db)
            .await;
        assert!(result.is_err());

        let result: Result<(DStatus,), _> = sqlx::query_as("SELECT 'abandoned'")
            .fetch_one(&*db)
            .await;
        assert!(result.is_err());
    }
}
