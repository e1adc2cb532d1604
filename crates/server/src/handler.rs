use std::sync::{Arc, Mutex, PoisonError};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use contactlink_core::{IdentifyRequest, IdentityView};
use contactlink_engine::Engine;
use contactlink_storage::ContactStore;

use crate::error::{ServerError, ServerResult};

/// Shared handler state. The engine sits behind a mutex and is only touched
/// from the blocking pool.
pub struct AppState<S: ContactStore> {
    engine: Arc<Mutex<Engine<S>>>,
    include_secondary_details: bool,
}

impl<S: ContactStore> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            include_secondary_details: self.include_secondary_details,
        }
    }
}

impl<S: ContactStore> AppState<S> {
    pub fn new(engine: Engine<S>, include_secondary_details: bool) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            include_secondary_details,
        }
    }

    pub fn engine(&self) -> &Arc<Mutex<Engine<S>>> {
        &self.engine
    }
}

pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn identify_handler<S>(
    State(state): State<AppState<S>>,
    payload: Result<Json<IdentifyRequest>, JsonRejection>,
) -> ServerResult<Json<IdentityView>>
where
    S: ContactStore + Send + 'static,
{
    let Json(request) = payload.map_err(|e| ServerError::BadRequest(e.body_text()))?;
    let request_id = Uuid::now_v7();
    let span = tracing::info_span!("identify", %request_id);

    let engine = Arc::clone(&state.engine);
    let view = tokio::task::spawn_blocking(move || -> ServerResult<IdentityView> {
        let _entered = span.enter();
        // A panicked call already rolled its transaction back.
        let mut engine = engine.lock().unwrap_or_else(PoisonError::into_inner);
        engine.identify(request).map_err(ServerError::from)
    })
    .await
    .map_err(|e| ServerError::Internal(e.to_string()))??;

    if state.include_secondary_details {
        Ok(Json(view))
    } else {
        Ok(Json(view.without_secondary_details()))
    }
}
