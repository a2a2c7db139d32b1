use axum::routing::{get, post};
use axum::Router;

pub mod history;
pub mod initiate;
pub mod pending;
pub mod respond;
pub mod status;

pub use history::{HistoryRequest, HistoryResponse};
pub use initiate::InitiateResponse;
pub use pending::{PendingRequest, PendingResponse};
pub use respond::RespondResponse;
pub use status::{StatusRequest, StatusResponse};

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/initiate", post(initiate::handler))
        .route("/respond", post(respond::handler))
        .route("/pending", get(pending::handler))
        .route("/status/:session_id", get(status::handler))
        .route("/history", get(history::handler))
        .with_state(state)
}
