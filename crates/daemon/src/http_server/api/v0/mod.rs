use axum::Router;

pub mod key_exchange;
pub mod messages;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .nest("/key-exchange", key_exchange::router(state.clone()))
        .nest("/messages", messages::router(state.clone()))
        .with_state(state)
}
