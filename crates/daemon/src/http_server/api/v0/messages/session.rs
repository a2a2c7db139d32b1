use axum::extract::{Json, State};
use axum::response::IntoResponse;
use axum_extra::extract::WithRejection;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::relay::DeliveredEnvelope;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessagesRequest {
    /// Session whose envelopes to fetch
    #[arg(long)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessagesResponse {
    pub success: bool,
    pub count: usize,
    pub messages: Vec<DeliveredEnvelope>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
    WithRejection(Json(req), _): WithRejection<Json<SessionMessagesRequest>, RelayRejection>,
) -> Result<impl IntoResponse, RelayRejection> {
    let messages = state
        .relay()
        .session_messages(caller, req.session_id, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(SessionMessagesResponse {
        success: true,
        count: messages.len(),
        messages,
    }))
}

impl ApiRequest for SessionMessagesRequest {
    type Response = SessionMessagesResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/messages/session/get")?;
        Ok(client.post(full_url).json(&self))
    }
}
