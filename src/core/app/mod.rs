//! Application state and its single serialized update path.
//!
//! Everything that mutates sessions goes through [`App`] on the event loop
//! that owns it. Stream tasks never touch the store; they send
//! [`AppAction`]s back which are applied in arrival order.

use std::collections::HashMap;

use tokio::sync::watch;
use tracing::warn;

use crate::core::models::ModelCatalog;
use crate::core::session::Session;
use crate::core::session_store::SessionStore;
use crate::core::storage::KeyValueStore;
use crate::core::theme::Theme;

pub mod actions;
pub mod sessions;
pub mod streaming;

pub use actions::{apply_action, apply_actions, AppAction, AppActionDispatcher, AppCommand};
pub use streaming::StreamPhase;

use streaming::InFlight;

pub struct App {
    store: SessionStore,
    settings: Box<dyn KeyValueStore>,
    catalog: &'static ModelCatalog,
    default_model: String,
    theme: Theme,
    active_session_id: Option<String>,
    streams: HashMap<String, InFlight>,
    next_stream_id: u64,
    revision: watch::Sender<u64>,
}

impl App {
    /// Restores sessions from `session_storage` and the theme from
    /// `settings_storage`. `default_model` is used for new sessions and falls
    /// back to the catalog default when it is not listed.
    pub fn new(
        session_storage: Box<dyn KeyValueStore>,
        settings_storage: Box<dyn KeyValueStore>,
        default_model: &str,
    ) -> Self {
        let catalog = ModelCatalog::builtin();
        if catalog.find(default_model).is_none() {
            warn!(model = default_model, "unknown default model; using catalog default");
        }
        let default_model = catalog.resolve(default_model).id.clone();
        let theme = Theme::load(settings_storage.as_ref());
        let (revision, _) = watch::channel(0);

        Self {
            store: SessionStore::load(session_storage),
            settings: settings_storage,
            catalog,
            default_model,
            theme,
            active_session_id: None,
            streams: HashMap::new(),
            next_stream_id: 0,
            revision,
        }
    }

    /// Revision counter bumped after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    pub(crate) fn notify(&self) {
        self.revision.send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    pub fn catalog(&self) -> &'static ModelCatalog {
        self.catalog
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn sessions(&self) -> Vec<&Session> {
        self.store.list_sessions()
    }

    pub fn session(&self, id: &str) -> Option<&Session> {
        self.store.get(id)
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.active_session_id.as_deref()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.active_session_id
            .as_deref()
            .and_then(|id| self.store.get(id))
    }
}
