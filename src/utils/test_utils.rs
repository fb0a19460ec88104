use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use futures_util::stream::{self, StreamExt};

use crate::core::app::App;
use crate::core::chat_stream::{
    CompletionBackend, CompletionRequest, FragmentStream, StreamMessage,
};
use crate::core::storage::{KeyValueStore, MemoryStore, StorageError, THEME_KEY};

pub fn create_test_app() -> App {
    App::new(
        Box::new(MemoryStore::new()),
        Box::new(MemoryStore::new().with_record(THEME_KEY, "light")),
        "gemini-flash-latest",
    )
}

/// Memory store that accepts `writes_left` writes and fails every later one.
pub struct FailingStore {
    inner: MemoryStore,
    writes_left: usize,
}

impl FailingStore {
    pub fn new(writes_left: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            writes_left,
        }
    }

    pub fn with_record(mut self, key: &str, value: &str) -> Self {
        self.inner = self.inner.with_record(key, value);
        self
    }
}

impl KeyValueStore for FailingStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.writes_left == 0 {
            return Err(StorageError::Write {
                path: PathBuf::from(format!("{key}.json")),
                source: io::Error::other("disk full"),
            });
        }
        self.writes_left -= 1;
        self.inner.set(key, value)
    }
}

/// Replays one scripted response per call and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Vec<StreamMessage>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Vec<StreamMessage>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn chunks(parts: &[&str]) -> Vec<StreamMessage> {
        parts
            .iter()
            .map(|part| StreamMessage::Chunk(part.to_string()))
            .collect()
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl CompletionBackend for ScriptedBackend {
    fn stream_chat(&self, request: CompletionRequest) -> FragmentStream {
        self.requests.lock().expect("requests lock").push(request);
        let script = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_default();
        stream::iter(script).boxed()
    }
}
