use tracing::{debug, warn};

use super::App;
use crate::core::chat_stream::{CompletionRequest, StreamParams};
use crate::core::message::{ImageAttachment, Message};

pub const STREAM_ERROR_NOTICE: &str = "An error occurred while communicating with the Gemini API. Please check the logs for details.";

/// Where a session is in its send cycle. Errors pass straight through to
/// `Idle` after the notice is written, so they have no resting state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Idle,
    Sending,
    Streaming,
}

/// Book-keeping for the one stream a session may have open.
pub(crate) struct InFlight {
    stream_id: u64,
    phase: StreamPhase,
    /// Messages that are final: history plus the new user message.
    committed: Vec<Message>,
    /// Every fragment received so far, concatenated.
    pending: String,
}

impl InFlight {
    fn snapshot(&self, model_content: String) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.committed.len() + 1);
        messages.extend(self.committed.iter().cloned());
        messages.push(Message::model(model_content));
        messages
    }
}

impl App {
    pub fn stream_phase(&self, session_id: &str) -> StreamPhase {
        self.streams
            .get(session_id)
            .map(|in_flight| in_flight.phase)
            .unwrap_or(StreamPhase::Idle)
    }

    pub fn is_streaming(&self, session_id: &str) -> bool {
        self.stream_phase(session_id) != StreamPhase::Idle
    }

    pub fn is_current_stream(&self, session_id: &str, stream_id: u64) -> bool {
        self.streams
            .get(session_id)
            .is_some_and(|in_flight| in_flight.stream_id == stream_id)
    }

    /// Appends the user message, persists it and returns the parameters for
    /// the stream that will answer it.
    ///
    /// Returns `None` without touching anything when the prompt is blank, the
    /// session is unknown, or the session already has a send in progress.
    pub fn begin_send(
        &mut self,
        session_id: &str,
        prompt: &str,
        image: Option<ImageAttachment>,
    ) -> Option<StreamParams> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return None;
        }
        let Some(mut session) = self.store.get(session_id).cloned() else {
            debug!(session = session_id, "send to unknown session ignored");
            return None;
        };
        if self.streams.contains_key(session_id) {
            debug!(session = session_id, "send rejected: a response is still streaming");
            return None;
        }

        let model = self.catalog.resolve(&session.model_id);
        let image = match image {
            Some(_) if !model.vision => {
                debug!(model = %model.id, "model has no vision support; image dropped");
                None
            }
            image => image,
        };

        let history = session.messages.clone();
        session.messages.push(Message::user(prompt, image.clone()));
        let committed = session.messages.clone();

        if let Err(err) = self.store.update(session) {
            warn!(
                session = session_id,
                error = %err,
                "failed to persist user message; send dropped"
            );
            return None;
        }

        self.next_stream_id += 1;
        let stream_id = self.next_stream_id;
        self.streams.insert(
            session_id.to_string(),
            InFlight {
                stream_id,
                phase: StreamPhase::Sending,
                committed,
                pending: String::new(),
            },
        );
        debug!(session = session_id, stream_id, model = %model.id, "send started");
        self.notify();

        Some(StreamParams {
            session_id: session_id.to_string(),
            stream_id,
            request: CompletionRequest {
                model_id: model.id.clone(),
                history,
                prompt: prompt.to_string(),
                image,
            },
        })
    }

    pub fn append_response_chunk(&mut self, session_id: &str, stream_id: u64, content: &str) {
        if !self.is_current_stream(session_id, stream_id) {
            return;
        }
        if content.is_empty() {
            return;
        }
        let Some(in_flight) = self.streams.get_mut(session_id) else {
            return;
        };
        in_flight.phase = StreamPhase::Streaming;
        in_flight.pending.push_str(content);
        let snapshot = in_flight.snapshot(in_flight.pending.clone());
        self.write_snapshot(session_id, snapshot);
    }

    pub fn complete_stream(&mut self, session_id: &str, stream_id: u64) {
        if !self.is_current_stream(session_id, stream_id) {
            return;
        }
        let Some(in_flight) = self.streams.remove(session_id) else {
            return;
        };
        let snapshot = in_flight.snapshot(in_flight.pending.clone());
        debug!(session = session_id, stream_id, "stream completed");
        self.write_snapshot(session_id, snapshot);
    }

    /// Freezes the model message with the fixed notice. The detail only goes
    /// to the log.
    pub fn fail_stream(&mut self, session_id: &str, stream_id: u64, detail: &str) {
        if !self.is_current_stream(session_id, stream_id) {
            return;
        }
        let Some(in_flight) = self.streams.remove(session_id) else {
            return;
        };
        warn!(session = session_id, stream_id, detail, "response stream failed");
        let content = if in_flight.pending.is_empty() {
            STREAM_ERROR_NOTICE.to_string()
        } else {
            format!("{}\n\n{}", in_flight.pending, STREAM_ERROR_NOTICE)
        };
        let snapshot = in_flight.snapshot(content);
        self.write_snapshot(session_id, snapshot);
    }

    /// Replaces the stored messages with `messages`, leaving every other field
    /// as currently stored. A session deleted meanwhile is left deleted.
    fn write_snapshot(&mut self, session_id: &str, messages: Vec<Message>) {
        let Some(mut session) = self.store.get(session_id).cloned() else {
            self.streams.remove(session_id);
            return;
        };
        session.messages = messages;
        if let Err(err) = self.store.update(session) {
            warn!(session = session_id, error = %err, "failed to persist response");
        }
        self.notify();
    }
}
