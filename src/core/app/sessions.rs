use std::path::{Path, PathBuf};

use tracing::debug;

use super::App;
use crate::core::export::{write_export, ExportError};
use crate::core::storage::StorageError;
use crate::core::theme::Theme;

impl App {
    /// Creates an empty session on the default model and makes it active.
    pub fn create_session(&mut self) -> Result<String, StorageError> {
        let session = self.store.create(&self.default_model)?;
        debug!(session = %session.id, "session created");
        self.active_session_id = Some(session.id.clone());
        self.notify();
        Ok(session.id)
    }

    /// Makes `id` the displayed session. Streams of other sessions keep
    /// running.
    pub fn select_session(&mut self, id: &str) -> bool {
        if !self.store.contains(id) {
            return false;
        }
        self.active_session_id = Some(id.to_string());
        self.notify();
        true
    }

    /// Deletes a session. The active pointer is cleared only when it pointed
    /// at the deleted session. An in-flight stream for it is forgotten so its
    /// remaining fragments are dropped.
    pub fn delete_session(&mut self, id: &str) -> Result<bool, StorageError> {
        let deleted = self.store.delete(id)?;
        if deleted {
            debug!(session = id, "session deleted");
            self.streams.remove(id);
            if self.active_session_id.as_deref() == Some(id) {
                self.active_session_id = None;
            }
            self.notify();
        }
        Ok(deleted)
    }

    /// Blank titles are ignored.
    pub fn rename_session(&mut self, id: &str, title: &str) -> Result<bool, StorageError> {
        let title = title.trim();
        if title.is_empty() {
            return Ok(false);
        }
        let renamed = self.store.rename(id, title)?;
        if renamed {
            self.notify();
        }
        Ok(renamed)
    }

    /// Switches the session to a catalog model. Unknown model ids are refused.
    pub fn set_session_model(&mut self, id: &str, model_id: &str) -> Result<bool, StorageError> {
        let Some(model) = self.catalog.find(model_id) else {
            return Ok(false);
        };
        let Some(mut session) = self.store.get(id).cloned() else {
            return Ok(false);
        };
        session.model_id = model.id.clone();
        let updated = self.store.update(session)?;
        if updated {
            self.notify();
        }
        Ok(updated)
    }

    pub fn toggle_theme(&mut self) -> Result<Theme, StorageError> {
        let theme = self.theme.toggled();
        theme.save(self.settings.as_mut())?;
        self.theme = theme;
        self.notify();
        Ok(theme)
    }

    pub fn export_session(
        &self,
        id: &str,
        dir: &Path,
        overwrite: bool,
    ) -> Result<Option<PathBuf>, ExportError> {
        match self.store.get(id) {
            Some(session) => write_export(session, dir, overwrite).map(Some),
            None => Ok(None),
        }
    }
}
