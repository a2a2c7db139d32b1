use axum::extract::{Json, State};
use axum::response::IntoResponse;
use axum_extra::extract::WithRejection;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::handshake::{InitiateRequest, InitiatedExchange};
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    pub success: bool,
    pub exchange: InitiatedExchange,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    WithRejection(Json(req), _): WithRejection<Json<InitiateRequest>, RelayRejection>,
) -> Result<impl IntoResponse, RelayRejection> {
    let exchange = state
        .handshakes()
        .initiate(caller, req, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok((
        StatusCode::CREATED,
        Json(InitiateResponse {
            success: true,
            exchange,
        }),
    ))
}

impl ApiRequest for InitiateRequest {
    type Response = InitiateResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/key-exchange/initiate")?;
        Ok(client.post(full_url).json(&self))
    }
}
