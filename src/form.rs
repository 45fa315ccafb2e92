//! The configuration form: a draft record plus the load / edit / save protocol
//! against the plugin host.
//!
//! Every operation that touches the network is split into `begin_*` and
//! `finish_*` halves so a caller holding the form behind a lock can release it
//! while the request is in flight. The async helpers (`initialize`, `reload`,
//! `save`) run both halves for callers that own the form outright.
//!
//! A ticket that is dropped before its `finish_*` call (a timed-out future, a
//! disconnected client) releases the form: nothing is applied and the form
//! reads as `Ready` again.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{ConfigError, RemoteOp};
use crate::models::{ConfigRecord, FieldKey, FieldKind, FieldSpec, FieldValue, FIELDS, MASK};
use crate::remote::RemoteStore;

pub type ChangeListener = Box<dyn FnMut(&ConfigRecord) + Send>;
pub type SaveHandler = Box<dyn FnMut(&ConfigRecord) -> Result<(), ConfigError> + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Persistence is deferred to the caller's save handler.
    PreInstall,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormState {
    Uninitialized,
    Loading,
    Ready,
    Saving,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    Seeded,
    Applied,
    /// The draft was edited while the load was in flight; the edits were kept.
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
    HandedOff,
    Persisted,
}

#[derive(Debug)]
pub struct LoadTicket {
    revision: u64,
    _live: Arc<()>,
}

/// Snapshot of the draft taken when a save began.
#[derive(Debug)]
pub struct SaveTicket {
    record: ConfigRecord,
    _live: Arc<()>,
}

impl SaveTicket {
    pub fn record(&self) -> &ConfigRecord {
        &self.record
    }
}

/// What the web page renders. Secrets are masked.
#[derive(Debug, Clone, Serialize)]
pub struct FormSnapshot {
    pub mode: Mode,
    pub state: FormState,
    pub record: ConfigRecord,
    pub fields: &'static [FieldSpec],
    pub last_error: Option<String>,
    pub last_saved_at: Option<DateTime<Utc>>,
}

pub struct ConfigForm {
    mode: Mode,
    state: FormState,
    draft: ConfigRecord,
    /// Bumped on every edit; a load only applies if nothing changed since it began.
    revision: u64,
    /// Held strongly by the outstanding ticket while loading or saving.
    in_flight: Weak<()>,
    on_change: Option<ChangeListener>,
    on_save: Option<SaveHandler>,
    last_error: Option<String>,
    last_saved_at: Option<DateTime<Utc>>,
}

impl ConfigForm {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            state: FormState::Uninitialized,
            draft: ConfigRecord::default(),
            revision: 0,
            in_flight: Weak::new(),
            on_change: None,
            on_save: None,
            last_error: None,
            last_saved_at: None,
        }
    }

    pub fn on_change(mut self, listener: impl FnMut(&ConfigRecord) + Send + 'static) -> Self {
        self.on_change = Some(Box::new(listener));
        self
    }

    pub fn on_save(
        mut self,
        handler: impl FnMut(&ConfigRecord) -> Result<(), ConfigError> + Send + 'static,
    ) -> Self {
        self.on_save = Some(Box::new(handler));
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> FormState {
        match self.state {
            FormState::Loading | FormState::Saving if self.in_flight.strong_count() == 0 => {
                FormState::Ready
            }
            state => state,
        }
    }

    pub fn draft(&self) -> &ConfigRecord {
        &self.draft
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn last_saved_at(&self) -> Option<DateTime<Utc>> {
        self.last_saved_at
    }

    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            mode: self.mode,
            state: self.state(),
            record: self.draft.redacted(),
            fields: &FIELDS,
            last_error: self.last_error.clone(),
            last_saved_at: self.last_saved_at,
        }
    }

    // ─── Load ─────────────────────────────────────────────────────

    /// Seeds the draft when a record is supplied, otherwise loads it from the store.
    ///
    /// A failed load leaves the draft at its defaults and the form ready; the
    /// error is still returned so the caller can surface it.
    pub async fn initialize(
        &mut self,
        seed: Option<ConfigRecord>,
        store: &dyn RemoteStore,
    ) -> Result<LoadOutcome, ConfigError> {
        match seed {
            Some(record) => self.seed(record),
            None => self.reload(store).await,
        }
    }

    pub async fn reload(&mut self, store: &dyn RemoteStore) -> Result<LoadOutcome, ConfigError> {
        let ticket = self.begin_load()?;
        let result = store.load().await;
        self.finish_load(ticket, result)
    }

    pub fn seed(&mut self, record: ConfigRecord) -> Result<LoadOutcome, ConfigError> {
        self.ensure_idle()?;
        self.draft = record;
        self.state = FormState::Ready;
        self.last_error = None;
        tracing::debug!("Draft seeded by caller");
        Ok(LoadOutcome::Seeded)
    }

    pub fn begin_load(&mut self) -> Result<LoadTicket, ConfigError> {
        self.ensure_idle()?;
        self.state = FormState::Loading;
        Ok(LoadTicket {
            revision: self.revision,
            _live: self.track_in_flight(),
        })
    }

    pub fn finish_load(
        &mut self,
        ticket: LoadTicket,
        result: Result<ConfigRecord, ConfigError>,
    ) -> Result<LoadOutcome, ConfigError> {
        self.state = FormState::Ready;
        match result {
            Ok(record) if ticket.revision == self.revision => {
                self.draft = record;
                self.last_error = None;
                tracing::info!("Loaded configuration from plugin host");
                Ok(LoadOutcome::Applied)
            }
            Ok(_) => {
                tracing::warn!("Discarding loaded configuration: draft was edited while loading");
                Ok(LoadOutcome::Superseded)
            }
            Err(e) => {
                tracing::warn!("No configuration loaded, keeping current draft: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    // ─── Edit ─────────────────────────────────────────────────────

    /// Replaces one field and notifies the change listener with the full record.
    ///
    /// Writing the mask back to a secret field leaves the secret as it was.
    pub fn set_field(
        &mut self,
        key: FieldKey,
        value: FieldValue,
    ) -> Result<&ConfigRecord, ConfigError> {
        let masked = matches!(&value, FieldValue::Text(v) if v == MASK);
        if masked && key.spec().kind == FieldKind::Secret {
            return Ok(&self.draft);
        }
        self.draft = self.draft.with_field(key, value)?;
        self.revision += 1;
        if let Some(listener) = self.on_change.as_mut() {
            listener(&self.draft);
        }
        Ok(&self.draft)
    }

    // ─── Save ─────────────────────────────────────────────────────

    /// Pre-install: hands the draft to the save handler. Normal: saves the
    /// draft to the store and restarts the service once the save succeeded.
    pub async fn save(&mut self, store: &dyn RemoteStore) -> Result<SaveOutcome, ConfigError> {
        match self.mode {
            Mode::PreInstall => self.hand_off(),
            Mode::Normal => {
                let ticket = self.begin_save()?;
                let result = persist(store, ticket.record()).await;
                self.finish_save(ticket, result)
            }
        }
    }

    pub fn hand_off(&mut self) -> Result<SaveOutcome, ConfigError> {
        self.ensure_idle()?;
        let Some(handler) = self.on_save.as_mut() else {
            tracing::warn!("Pre-install save with no save handler registered");
            self.last_error = Some(ConfigError::NoSaveHandler.to_string());
            return Err(ConfigError::NoSaveHandler);
        };

        match handler(&self.draft) {
            Ok(()) => {
                self.last_error = None;
                tracing::info!("Configuration handed off for install");
                Ok(SaveOutcome::HandedOff)
            }
            Err(e) => {
                tracing::error!("Save handler rejected configuration: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn begin_save(&mut self) -> Result<SaveTicket, ConfigError> {
        self.ensure_idle()?;
        self.state = FormState::Saving;
        Ok(SaveTicket {
            record: self.draft.clone(),
            _live: self.track_in_flight(),
        })
    }

    /// The draft is never rolled back here, whatever the result.
    pub fn finish_save(
        &mut self,
        _ticket: SaveTicket,
        result: Result<(), ConfigError>,
    ) -> Result<SaveOutcome, ConfigError> {
        self.state = FormState::Ready;
        match result {
            Ok(()) => {
                self.last_error = None;
                self.last_saved_at = Some(Utc::now());
                tracing::info!("Configuration saved and restart requested");
                Ok(SaveOutcome::Persisted)
            }
            Err(e) => {
                if e.op() == Some(RemoteOp::Restart) {
                    self.last_saved_at = Some(Utc::now());
                }
                tracing::error!("Failed to save configuration: {}", e);
                self.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn track_in_flight(&mut self) -> Arc<()> {
        let live = Arc::new(());
        self.in_flight = Arc::downgrade(&live);
        live
    }

    fn ensure_idle(&self) -> Result<(), ConfigError> {
        match self.state() {
            FormState::Saving => Err(ConfigError::SaveInFlight),
            FormState::Loading => Err(ConfigError::LoadInFlight),
            FormState::Uninitialized | FormState::Ready => Ok(()),
        }
    }
}

/// Save, then restart only if the save went through.
pub async fn persist(store: &dyn RemoteStore, record: &ConfigRecord) -> Result<(), ConfigError> {
    store.save(record).await?;
    store.restart().await
}
