//! Shared fixture for relay integration tests: a migrated database, the
//! directory-backed identity gateway and three users.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;

use ::common::prelude::UserId;
use courier_daemon::database::directory::{DirectoryIdentity, PublishedKeys};
use courier_daemon::database::types::unix_millis;
use courier_daemon::database::Database;
use courier_daemon::handshake::{InitiateRequest, RespondRequest};
use courier_daemon::relay::SendRequest;
use courier_daemon::ServiceState;

pub const CIPHERTEXT: &str = "c2VhbGVkLWVudmVsb3BlLWJvZHktZm9yLXRlc3Rz";

#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: UserId,
    pub token: String,
}

pub struct Fixture {
    pub db: Database,
    pub identity: Arc<DirectoryIdentity>,
    pub state: ServiceState,
    /// Has published keys
    pub alice: TestUser,
    /// Has published keys
    pub bob: TestUser,
    /// Registered, but never published any keys
    pub carol: TestUser,
}

fn keys(name: &str) -> PublishedKeys {
    PublishedKeys {
        signing_public_key: Some(format!("{}-signing-key", name)),
        ecc_public_key: Some(format!("{}-ecc-key", name)),
        rsa_public_key: None,
    }
}

async fn add_user(identity: &DirectoryIdentity, name: &str, keys: PublishedKeys) -> TestUser {
    let id = identity.register_user(name, &keys).await.unwrap();
    let token = identity.issue_token(&id, None).await.unwrap();
    TestUser { id, token }
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_database(Database::in_memory().await.unwrap()).await
    }

    /// On-disk database, for tests that need real connection concurrency
    pub async fn on_disk(path: &Path) -> Self {
        let url = Database::sqlite_url(path).unwrap();
        Self::with_database(Database::connect(&url).await.unwrap()).await
    }

    async fn with_database(db: Database) -> Self {
        let identity = Arc::new(DirectoryIdentity::new(db.clone()));

        let alice = add_user(&identity, "alice", keys("alice")).await;
        let bob = add_user(&identity, "bob", keys("bob")).await;
        let carol = add_user(&identity, "carol", PublishedKeys::default()).await;

        let state = ServiceState::new(db.clone(), identity.clone());

        Self {
            db,
            identity,
            state,
            alice,
            bob,
            carol,
        }
    }

    /// Run a full exchange from `initiator` to `responder`
    pub async fn complete_exchange(
        &self,
        session_id: &str,
        initiator: &TestUser,
        responder: &TestUser,
        now: OffsetDateTime,
    ) {
        let handshakes = self.state.handshakes();
        handshakes
            .initiate(initiator.id, initiate_request(session_id, responder.id, now), now)
            .await
            .unwrap();
        handshakes
            .respond(responder.id, respond_request(session_id, now), now)
            .await
            .unwrap();
    }
}

pub fn initiate_request(session_id: &str, peer: UserId, now: OffsetDateTime) -> InitiateRequest {
    InitiateRequest {
        peer_id: Some(peer.to_string()),
        session_id: Some(session_id.to_string()),
        ecdh_public_key: Some("initiator-ecdh".to_string()),
        challenge: Some("challenge".to_string()),
        timestamp: Some(unix_millis(now)),
        signature: Some("initiator-signature".to_string()),
    }
}

pub fn respond_request(session_id: &str, now: OffsetDateTime) -> RespondRequest {
    RespondRequest {
        session_id: Some(session_id.to_string()),
        ecdh_public_key: Some("responder-ecdh".to_string()),
        challenge_response: Some("challenge-response".to_string()),
        timestamp: Some(unix_millis(now)),
        signature: Some("responder-signature".to_string()),
    }
}

pub fn send_request(
    session_id: &str,
    receiver: UserId,
    nonce: &str,
    sequence_number: i64,
    now: OffsetDateTime,
) -> SendRequest {
    SendRequest {
        session_id: Some(session_id.to_string()),
        receiver_id: Some(receiver.to_string()),
        ciphertext: Some(CIPHERTEXT.to_string()),
        iv: Some("aXYtYnl0ZXM=".to_string()),
        nonce: Some(nonce.to_string()),
        timestamp: Some(unix_millis(now)),
        sequence_number: Some(sequence_number),
    }
}
