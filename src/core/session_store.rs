//! Ordered, durably persisted collection of chat sessions.

use chrono::Utc;
use tracing::{debug, warn};

use crate::core::session::Session;
use crate::core::storage::{KeyValueStore, StorageError, SESSIONS_KEY};

pub struct SessionStore {
    storage: Box<dyn KeyValueStore>,
    sessions: Vec<Session>,
}

impl SessionStore {
    /// Restores the session list from `storage`.
    ///
    /// A missing record starts an empty store. A record that cannot be read or
    /// parsed is logged and also yields an empty store; startup never fails on
    /// persisted state.
    pub fn load(storage: Box<dyn KeyValueStore>) -> Self {
        let sessions = match storage.get(SESSIONS_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<Session>>(&raw) {
                Ok(sessions) => dedupe_ids(sessions),
                Err(err) => {
                    warn!(error = %err, "persisted sessions are corrupt; starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(error = %err, "persisted sessions are unreadable; starting empty");
                Vec::new()
            }
        };
        debug!(count = sessions.len(), "session store loaded");
        Self { storage, sessions }
    }

    /// Sessions ordered by creation time, newest first.
    pub fn list_sessions(&self) -> Vec<&Session> {
        let mut ordered: Vec<&Session> = self.sessions.iter().collect();
        ordered.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        ordered
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.iter().find(|session| session.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Creates, stores and persists a new empty session.
    ///
    /// Every mutation below is rolled back when the write fails, so memory
    /// never holds state the storage does not.
    pub fn create(&mut self, model_id: &str) -> Result<Session, StorageError> {
        let created_at = Utc::now().timestamp_millis();
        let id = self.unique_id(created_at);
        let session = Session::new(id, model_id, created_at);
        self.sessions.push(session.clone());
        if let Err(err) = self.persist() {
            self.sessions.pop();
            return Err(err);
        }
        Ok(session)
    }

    /// Replaces the stored session carrying the same id. Returns `false` and
    /// writes nothing when no such session exists.
    pub fn update(&mut self, session: Session) -> Result<bool, StorageError> {
        let Some(index) = self.position(&session.id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(&mut self.sessions[index], session);
        if let Err(err) = self.persist() {
            self.sessions[index] = previous;
            return Err(err);
        }
        Ok(true)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool, StorageError> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let removed = self.sessions.remove(index);
        if let Err(err) = self.persist() {
            self.sessions.insert(index, removed);
            return Err(err);
        }
        Ok(true)
    }

    pub fn rename(&mut self, id: &str, title: &str) -> Result<bool, StorageError> {
        let Some(index) = self.position(id) else {
            return Ok(false);
        };
        let previous = std::mem::replace(&mut self.sessions[index].title, title.to_string());
        if let Err(err) = self.persist() {
            self.sessions[index].title = previous;
            return Err(err);
        }
        Ok(true)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.sessions.iter().position(|session| session.id == id)
    }

    fn persist(&mut self) -> Result<(), StorageError> {
        let serialized =
            serde_json::to_string(&self.sessions).map_err(|source| StorageError::Encode {
                key: SESSIONS_KEY.to_string(),
                source,
            })?;
        self.storage.set(SESSIONS_KEY, &serialized)
    }

    fn unique_id(&self, created_at: i64) -> String {
        let mut candidate = created_at;
        while self.contains(&candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }
}

fn dedupe_ids(sessions: Vec<Session>) -> Vec<Session> {
    let mut seen = std::collections::HashSet::new();
    let total = sessions.len();
    let unique: Vec<Session> = sessions
        .into_iter()
        .filter(|session| seen.insert(session.id.clone()))
        .collect();
    if unique.len() != total {
        warn!(
            dropped = total - unique.len(),
            "dropped sessions with duplicate ids"
        );
    }
    unique
}
