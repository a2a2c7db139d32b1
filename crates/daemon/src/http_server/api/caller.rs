use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use http::request::Parts;

use common::prelude::UserId;

use super::RelayRejection;
use crate::error::RelayError;
use crate::ServiceState;

/// The authenticated user behind a request.
///
/// Resolved from the `Authorization: Bearer` header through the identity
/// gateway. Requests without a valid credential are refused before any
/// handler runs.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub UserId);

#[async_trait]
impl FromRequestParts<ServiceState> for Caller {
    type Rejection = RelayRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServiceState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| state.reject(RelayError::Unauthenticated))?;

        let user_id = state
            .identity()
            .resolve_caller(bearer.token())
            .await
            .map_err(|err| {
                let err = RelayError::from(err);
                err.trace("authenticate");
                state.reject(err)
            })?;

        Ok(Caller(user_id))
    }
}
