use axum::extract::{Json, State};
use axum::response::IntoResponse;
use axum_extra::extract::WithRejection;
use http::StatusCode;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::http_server::api::client::ApiRequest;
use crate::http_server::api::{Caller, RelayRejection};
use crate::relay::{SendRequest, SentEnvelope};
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub success: bool,
    pub envelope: SentEnvelope,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Caller(sender): Caller,
    WithRejection(Json(req), _): WithRejection<Json<SendRequest>, RelayRejection>,
) -> Result<impl IntoResponse, RelayRejection> {
    let envelope = state
        .relay()
        .send(sender, req, OffsetDateTime::now_utc())
        .await
        .map_err(|e| state.reject(e))?;

    Ok((
        StatusCode::CREATED,
        Json(SendResponse {
            success: true,
            envelope,
        }),
    ))
}

impl ApiRequest for SendRequest {
    type Response = SendResponse;

    fn build_request(
        self,
        base_url: &Url,
        client: &Client,
    ) -> Result<RequestBuilder, url::ParseError> {
        let full_url = base_url.join("/api/v0/messages/send")?;
        Ok(client.post(full_url).json(&self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_request_posts_camel_case_body() {
        let base = Url::parse("http://localhost:5000").unwrap();
        let request = SendRequest {
            session_id: Some("s1".to_string()),
            receiver_id: Some("peer".to_string()),
            nonce: Some("n-1".to_string()),
            sequence_number: Some(0),
            ..Default::default()
        }
        .build_request(&base, &Client::new())
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(request.method(), &http::Method::POST);
        assert_eq!(request.url().path(), "/api/v0/messages/send");

        let body: serde_json::Value =
            serde_json::from_slice(request.body().unwrap().as_bytes().unwrap()).unwrap();
        assert_eq!(body["sessionId"], "s1");
        assert_eq!(body["receiverId"], "peer");
        assert_eq!(body["nonce"], "n-1");
        assert_eq!(body["sequenceNumber"], 0);
    }
}
