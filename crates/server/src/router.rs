use axum::routing::{get, post};
use axum::Router;

use contactlink_storage::ContactStore;

use crate::handler::{self, AppState};

/// Build the axum router with all endpoints.
pub fn build_router<S>(state: AppState<S>) -> Router
where
    S: ContactStore + Send + 'static,
{
    Router::new()
        .route("/health", get(handler::health_handler))
        .route("/identify", post(handler::identify_handler::<S>))
        .with_state(state)
}
