//! The relay API driven through the full router, without a socket

mod common;

use axum::body::Body;
use axum::Router;
use http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;

use courier_daemon::database::types::unix_millis;
use courier_daemon::http_server;

use crate::common::{Fixture, TestUser, CIPHERTEXT};

async fn call(
    router: &Router,
    method: Method,
    uri: &str,
    user: Option<&TestUser>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", user.token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_requests_without_valid_token_are_refused() {
    let fx = Fixture::new().await;
    let router = http_server::router(fx.state.clone());

    let (status, body) = call(&router, Method::GET, "/api/v0/key-exchange/pending", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["errorCode"], "UNAUTHENTICATED");
    assert_eq!(body["category"], "authentication");

    let forged = TestUser {
        id: fx.alice.id,
        token: "0".repeat(64),
    };
    let (status, _) = call(
        &router,
        Method::GET,
        "/api/v0/messages/conversations",
        Some(&forged),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_body() {
    let fx = Fixture::new().await;
    let router = http_server::router(fx.state.clone());

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/v0/key-exchange/initiate")
        .header(header::AUTHORIZATION, format!("Bearer {}", fx.alice.token))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["errorCode"], "MALFORMED_REQUEST");
    assert_eq!(body["category"], "validation");
}

#[tokio::test]
async fn test_exchange_then_message_over_http() {
    let fx = Fixture::new().await;
    let router = http_server::router(fx.state.clone());
    let now = unix_millis(OffsetDateTime::now_utc());

    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v0/key-exchange/initiate",
        Some(&fx.alice),
        Some(json!({
            "peerId": fx.bob.id.to_string(),
            "sessionId": "s1",
            "ecdhPublicKey": "initiator-ecdh",
            "challenge": "challenge",
            "timestamp": now,
            "signature": "initiator-signature",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["exchange"]["status"], "pending");

    let (status, body) = call(
        &router,
        Method::GET,
        "/api/v0/key-exchange/pending",
        Some(&fx.bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["exchanges"][0]["ecdhPublicKey"], "initiator-ecdh");

    let (status, _) = call(
        &router,
        Method::POST,
        "/api/v0/key-exchange/respond",
        Some(&fx.bob),
        Some(json!({
            "sessionId": "s1",
            "ecdhPublicKey": "responder-ecdh",
            "challengeResponse": "challenge-response",
            "timestamp": now,
            "signature": "responder-signature",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &router,
        Method::GET,
        "/api/v0/key-exchange/status/s1",
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["exchange"]["status"], "completed");

    let envelope = json!({
        "sessionId": "s1",
        "receiverId": fx.bob.id.to_string(),
        "ciphertext": CIPHERTEXT,
        "iv": "aXYtYnl0ZXM=",
        "nonce": "n-0",
        "timestamp": now,
        "sequenceNumber": 0,
    });
    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v0/messages/send",
        Some(&fx.alice),
        Some(envelope.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["envelope"]["sequenceNumber"], 0);

    // replaying the exact envelope is refused without echoing stored state
    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v0/messages/send",
        Some(&fx.alice),
        Some(envelope),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errorCode"], "REPLAY_ATTACK_NONCE");
    assert_eq!(body["category"], "replay");
    assert!(body.get("detail").is_none());

    let (status, body) = call(
        &router,
        Method::POST,
        "/api/v0/messages/session/get",
        Some(&fx.bob),
        Some(json!({ "sessionId": "s1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["messages"][0]["ciphertext"], CIPHERTEXT);
}

#[tokio::test]
async fn test_status_of_unknown_session() {
    let fx = Fixture::new().await;
    let router = http_server::router(fx.state.clone());

    let (status, body) = call(
        &router,
        Method::GET,
        "/api/v0/key-exchange/status/missing",
        Some(&fx.alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_health_and_fallback() {
    let fx = Fixture::new().await;
    let router = http_server::router(fx.state.clone());

    let (status, body) = call(&router, Method::GET, "/_status/livez", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _) = call(&router, Method::GET, "/_status/readyz", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(&router, Method::GET, "/api/v0/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["errorCode"], "ROUTE_NOT_FOUND");
}
