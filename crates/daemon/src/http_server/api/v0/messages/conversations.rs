use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::relay::Conversation;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct ConversationsRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationsResponse {
    pub success: bool,
    pub conversations: Vec<Conversation>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
) -> Result<impl IntoResponse, RelayRejection> {
    let conversations = state
        .relay()
        .conversations(caller, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(ConversationsResponse {
        success: true,
        conversations,
    }))
}

impl ApiRequest for ConversationsRequest {
    type Response = ConversationsResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/messages/conversations")?;
        Ok(client.get(full_url))
    }
}
