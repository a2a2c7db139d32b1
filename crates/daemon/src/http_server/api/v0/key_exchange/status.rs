use axum::extract::{Json, Path, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::handshake::ExchangeStatus;
use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize, clap::Args)]
pub struct StatusRequest {
    /// Key exchange session to inspect
    #[arg(long)]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub success: bool,
    pub exchange: ExchangeStatus,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RelayRejection> {
    let exchange = state
        .handshakes()
        .status(caller, &session_id, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(StatusResponse {
        success: true,
        exchange,
    }))
}

impl ApiRequest for StatusRequest {
    type Response = StatusResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let mut full_url = base_url.join("/api/v0/key-exchange/status/")?;
        full_url
            .path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push(&self.session_id);
        Ok(client.get(full_url))
    }
}
