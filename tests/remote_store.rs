use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use vaultwarden_config::form::{ConfigForm, FormState, LoadOutcome, Mode, SaveOutcome};
use vaultwarden_config::remote::{HttpRemoteStore, RemoteStore};
use vaultwarden_config::{ConfigError, ConfigRecord, FieldKey, FieldValue, RemoteOp};

const PLUGIN_PATH: &str = "/api/plugins/vaultwarden";

/// Stand-in for the plugin host's config endpoints.
#[derive(Default)]
struct PluginHost {
    stored: Mutex<Value>,
    events: Mutex<Vec<String>>,
    request_ids: Mutex<Vec<String>>,
    fail_save: bool,
    malformed_load: bool,
}

impl PluginHost {
    fn with_config(config: Value) -> Self {
        Self {
            stored: Mutex::new(config),
            ..Self::default()
        }
    }

    async fn record(&self, event: &str, headers: &HeaderMap) {
        self.events.lock().await.push(event.to_string());
        if let Some(id) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
            self.request_ids.lock().await.push(id.to_string());
        }
    }
}

async fn get_config(State(host): State<Arc<PluginHost>>, headers: HeaderMap) -> Response {
    host.record("GET /config", &headers).await;
    if host.malformed_load {
        return (StatusCode::OK, "{\"DOMAIN\": ").into_response();
    }
    Json(host.stored.lock().await.clone()).into_response()
}

async fn post_config(
    State(host): State<Arc<PluginHost>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    host.record("POST /config", &headers).await;
    if host.fail_save {
        return (StatusCode::INTERNAL_SERVER_ERROR, "disk full").into_response();
    }
    *host.stored.lock().await = body;
    StatusCode::OK.into_response()
}

async fn restart(State(host): State<Arc<PluginHost>>, headers: HeaderMap) -> StatusCode {
    host.record("POST /restart", &headers).await;
    StatusCode::OK
}

async fn spawn_plugin_host(
    host: Arc<PluginHost>,
) -> Result<(String, tokio::sync::oneshot::Sender<()>)> {
    let app = Router::new()
        .route(&format!("{PLUGIN_PATH}/config"), get(get_config).post(post_config))
        .route(&format!("{PLUGIN_PATH}/restart"), post(restart))
        .with_state(host);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let _ = server.await;
    });
    Ok((format!("http://{addr}{PLUGIN_PATH}"), shutdown_tx))
}

#[tokio::test]
async fn load_then_save_posts_the_draft_and_restarts() -> Result<()> {
    let host = Arc::new(PluginHost::with_config(json!({
        "DOMAIN": "https://vault.example.com",
        "ALLOW_SIGNUPS": false,
        "PORT": 8100,
        "SMTP_PORT": "587",
        "ROCKET_WORKERS": 4
    })));
    let (url, _shutdown) = spawn_plugin_host(Arc::clone(&host)).await?;
    let store = HttpRemoteStore::new(&url, None)?;

    let mut form = ConfigForm::new(Mode::Normal);
    assert_eq!(form.initialize(None, &store).await?, LoadOutcome::Applied);
    assert_eq!(form.draft().port, "8100");

    form.set_field(FieldKey::AllowSignups, FieldValue::Bool(true))?;
    form.set_field(FieldKey::Port, FieldValue::Text("443".to_string()))?;
    assert_eq!(form.save(&store).await?, SaveOutcome::Persisted);

    assert_eq!(
        *host.events.lock().await,
        vec!["GET /config", "POST /config", "POST /restart"]
    );

    let stored = host.stored.lock().await.clone();
    assert_eq!(stored, serde_json::to_value(form.draft())?);
    assert_eq!(stored["PORT"], json!("443"));
    assert_eq!(stored["ALLOW_SIGNUPS"], json!(true));
    assert_eq!(stored["ROCKET_WORKERS"], json!(4));

    let ids = host.request_ids.lock().await;
    assert_eq!(ids.len(), 3);
    assert!(ids.iter().all(|id| id.starts_with("req_")));
    Ok(())
}

#[tokio::test]
async fn failed_save_never_restarts() -> Result<()> {
    let host = Arc::new(PluginHost {
        fail_save: true,
        ..PluginHost::with_config(json!({ "DOMAIN": "https://vault.example.com" }))
    });
    let (url, _shutdown) = spawn_plugin_host(Arc::clone(&host)).await?;
    let store = HttpRemoteStore::new(&url, None)?;

    let mut form = ConfigForm::new(Mode::Normal);
    form.initialize(None, &store).await?;
    form.set_field(FieldKey::SmtpHost, FieldValue::Text("smtp.example.com".to_string()))?;
    let draft = form.draft().clone();

    let err = form.save(&store).await.unwrap_err();

    match err {
        ConfigError::Http { op, status, body } => {
            assert_eq!(op, RemoteOp::Save);
            assert_eq!(status, 500);
            assert_eq!(body, "disk full");
        }
        other => panic!("expected HTTP error, got {other:?}"),
    }
    assert_eq!(*host.events.lock().await, vec!["GET /config", "POST /config"]);
    assert_eq!(form.draft(), &draft);
    assert_eq!(form.state(), FormState::Ready);
    Ok(())
}

#[tokio::test]
async fn malformed_load_leaves_defaults() -> Result<()> {
    let host = Arc::new(PluginHost {
        malformed_load: true,
        ..PluginHost::default()
    });
    let (url, _shutdown) = spawn_plugin_host(host).await?;
    let store = HttpRemoteStore::new(&url, None)?;

    let mut form = ConfigForm::new(Mode::Normal);
    let err = form.initialize(None, &store).await.unwrap_err();

    assert!(matches!(err, ConfigError::Decode { op: RemoteOp::Load, .. }));
    assert_eq!(form.draft(), &ConfigRecord::default());
    assert_eq!(form.state(), FormState::Ready);
    Ok(())
}

#[tokio::test]
async fn unreachable_host_leaves_defaults() -> Result<()> {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let store = HttpRemoteStore::new(&format!("http://{addr}{PLUGIN_PATH}"), None)?;
    let mut form = ConfigForm::new(Mode::Normal);
    let err = form.initialize(None, &store).await.unwrap_err();

    assert!(matches!(err, ConfigError::Request { op: RemoteOp::Load, .. }));
    assert_eq!(form.draft(), &ConfigRecord::default());
    Ok(())
}

#[tokio::test]
async fn restart_alone_posts_without_body() -> Result<()> {
    let host = Arc::new(PluginHost::default());
    let (url, _shutdown) = spawn_plugin_host(Arc::clone(&host)).await?;
    let store = HttpRemoteStore::new(&url, None)?;

    store.restart().await?;

    assert_eq!(*host.events.lock().await, vec!["POST /restart"]);
    Ok(())
}
