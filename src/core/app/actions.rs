use tokio::sync::mpsc;

use super::App;
use crate::core::chat_stream::StreamParams;
use crate::core::message::ImageAttachment;

#[derive(Debug)]
pub enum AppAction {
    SubmitMessage {
        session_id: String,
        prompt: String,
        image: Option<ImageAttachment>,
    },
    AppendResponseChunk {
        session_id: String,
        stream_id: u64,
        content: String,
    },
    StreamErrored {
        session_id: String,
        stream_id: u64,
        detail: String,
    },
    StreamCompleted {
        session_id: String,
        stream_id: u64,
    },
}

#[derive(Clone)]
pub struct AppActionDispatcher {
    tx: mpsc::UnboundedSender<AppAction>,
}

impl AppActionDispatcher {
    pub fn new(tx: mpsc::UnboundedSender<AppAction>) -> Self {
        Self { tx }
    }

    /// Sends are dropped silently once the event loop is gone.
    pub fn dispatch(&self, action: AppAction) {
        let _ = self.tx.send(action);
    }

    pub fn dispatch_many<I>(&self, actions: I)
    where
        I: IntoIterator<Item = AppAction>,
    {
        for action in actions.into_iter() {
            self.dispatch(action);
        }
    }
}

pub enum AppCommand {
    SpawnStream(StreamParams),
}

pub fn apply_actions(app: &mut App, actions: impl IntoIterator<Item = AppAction>) -> Vec<AppCommand> {
    let mut commands = Vec::new();
    for action in actions {
        if let Some(cmd) = apply_action(app, action) {
            commands.push(cmd);
        }
    }
    commands
}

pub fn apply_action(app: &mut App, action: AppAction) -> Option<AppCommand> {
    match action {
        AppAction::SubmitMessage {
            session_id,
            prompt,
            image,
        } => app
            .begin_send(&session_id, &prompt, image)
            .map(AppCommand::SpawnStream),
        AppAction::AppendResponseChunk {
            session_id,
            stream_id,
            content,
        } => {
            app.append_response_chunk(&session_id, stream_id, &content);
            None
        }
        AppAction::StreamErrored {
            session_id,
            stream_id,
            detail,
        } => {
            app.fail_stream(&session_id, stream_id, &detail);
            None
        }
        AppAction::StreamCompleted {
            session_id,
            stream_id,
        } => {
            app.complete_stream(&session_id, stream_id);
            None
        }
    }
}
