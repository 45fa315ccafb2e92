pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod form;
pub mod handlers;
pub mod models;
pub mod remote;

use std::sync::Arc;

use axum::Router;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::form::ConfigForm;
use crate::remote::RemoteStore;

pub use crate::error::{ConfigError, RemoteOp};
pub use crate::form::{FormSnapshot, FormState, LoadOutcome, Mode, SaveOutcome};
pub use crate::models::{ConfigRecord, FieldKey, FieldValue};
pub use crate::remote::HttpRemoteStore;

pub struct AppState {
    /// Never held across a remote call; see `handlers`.
    pub form: Mutex<ConfigForm>,
    pub store: Arc<dyn RemoteStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(form: ConfigForm, store: Arc<dyn RemoteStore>, config: Config) -> Self {
        Self {
            form: Mutex::new(form),
            store,
            config,
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Form page (web UI)
        .merge(dashboard::routes())
        // JSON API behind the page
        .nest("/api", handlers::api_routes())
        // No CORS layer: the page and the API share one origin.
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
