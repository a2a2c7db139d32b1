use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::handshake::ExchangeSummary;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct HistoryRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub success: bool,
    pub exchanges: Vec<ExchangeSummary>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
) -> Result<impl IntoResponse, RelayRejection> {
    let exchanges = state
        .handshakes()
        .history(caller, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(HistoryResponse {
        success: true,
        exchanges,
    }))
}

impl ApiRequest for HistoryRequest {
    type Response = HistoryResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/key-exchange/history")?;
        Ok(client.get(full_url))
    }
}
