use axum::routing::{get, post};
use axum::Router;

pub mod cleanup;
pub mod conversations;
pub mod send;
pub mod session;

pub use cleanup::{CleanupRequest, CleanupResponse};
pub use conversations::{ConversationsRequest, ConversationsResponse};
pub use send::SendResponse;
pub use session::{SessionMessagesRequest, SessionMessagesResponse};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/send", post(send::handler))
        .route("/session/get", post(session::handler))
        .route("/conversations", get(conversations::handler))
        .route("/cleanup", post(cleanup::handler))
        .with_state(state)
}
