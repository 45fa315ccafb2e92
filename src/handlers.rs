use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;

use crate::error::ConfigError;
use crate::form::{persist, FormSnapshot, Mode};
use crate::models::{FieldKey, SetFieldRequest};
use crate::AppState;

type AppResult<T> = Result<T, ConfigError>;

// ─── REST API Routes ─────────────────────────────────────────────
//
// The form lock is taken per step and released before any call to the
// plugin host, so a second save arriving mid-flight sees the `saving` state
// and gets a 409 instead of queueing behind the first.

pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/form", get(get_form))
        .route("/form/fields/:key", put(set_field))
        .route("/form/save", post(save_form))
        .route("/form/reload", post(reload_form))
}

async fn get_form(State(state): State<Arc<AppState>>) -> Json<FormSnapshot> {
    Json(state.form.lock().await.snapshot())
}

async fn set_field(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Json(body): Json<SetFieldRequest>,
) -> AppResult<Json<FormSnapshot>> {
    let key: FieldKey = key.parse()?;
    let mut form = state.form.lock().await;
    form.set_field(key, body.value)?;
    Ok(Json(form.snapshot()))
}

async fn save_form(State(state): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let mode = state.form.lock().await.mode();

    let outcome = match mode {
        Mode::PreInstall => state.form.lock().await.hand_off()?,
        Mode::Normal => {
            let ticket = state.form.lock().await.begin_save()?;
            let result = persist(state.store.as_ref(), ticket.record()).await;
            state.form.lock().await.finish_save(ticket, result)?
        }
    };

    let snapshot = state.form.lock().await.snapshot();
    Ok(Json(json!({
        "outcome": outcome,
        "form": snapshot
    })))
}

async fn reload_form(State(state): State<Arc<AppState>>) -> AppResult<Json<FormSnapshot>> {
    let ticket = state.form.lock().await.begin_load()?;
    let result = state.store.load().await;

    let mut form = state.form.lock().await;
    form.finish_load(ticket, result)?;
    Ok(Json(form.snapshot()))
}
