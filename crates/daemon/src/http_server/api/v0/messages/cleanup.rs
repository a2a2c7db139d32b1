use axum::extract::{Json, State};
use axum::response::IntoResponse;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::relay::retention_cutoff;
use crate::ServiceState;

#[derive(Debug, Clone, Default, Serialize, Deserialize, clap::Args)]
pub struct CleanupRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResponse {
    pub success: bool,
    pub deleted_count: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(caller): Caller,
) -> Result<impl IntoResponse, RelayRejection> {
    tracing::info!(requested_by = %caller, "envelope cleanup requested");

    let deleted_count = state
        .relay()
        .cleanup(retention_cutoff(OffsetDateTime::now_utc()))
        .await
        .map_err(|e| state.reject(e))?;

    Ok(Json(CleanupResponse {
        success: true,
        deleted_count,
    }))
}

impl ApiRequest for CleanupRequest {
    type Response = CleanupResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/messages/cleanup")?;
        Ok(client.post(full_url))
    }
}
