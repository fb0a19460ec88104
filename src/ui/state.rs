use std::path::PathBuf;

use crate::core::app::App;
use crate::core::message::ImageAttachment;

/// An image waiting to go out with the next prompt.
#[derive(Debug, Clone)]
pub struct PendingImage {
    pub path: PathBuf,
    pub image: ImageAttachment,
}

/// Front-end state wrapped around the core [`App`].
pub struct ChatState {
    pub app: App,
    pub attachment: Option<PendingImage>,
    pub export_dir: PathBuf,
    pub speech_available: bool,
    pub listening: bool,
    /// Dictated text waiting to be sent with the next typed line.
    draft: String,
    notices: Vec<String>,
}

impl ChatState {
    pub fn new(app: App, export_dir: PathBuf) -> Self {
        Self {
            app,
            attachment: None,
            export_dir,
            speech_available: false,
            listening: false,
            draft: String::new(),
            notices: Vec::new(),
        }
    }

    /// Queues a line of feedback for the user.
    pub fn notice(&mut self, message: impl Into<String>) {
        self.notices.push(message.into());
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn append_draft(&mut self, text: &str) {
        if !self.draft.is_empty() {
            self.draft.push(' ');
        }
        self.draft.push_str(text);
    }

    /// Prepends any dictated draft to `line` and clears the draft.
    pub fn take_draft_with(&mut self, line: &str) -> String {
        let draft = std::mem::take(&mut self.draft);
        match (draft.is_empty(), line.trim().is_empty()) {
            (true, _) => line.to_string(),
            (false, true) => draft,
            (false, false) => format!("{draft} {}", line.trim()),
        }
    }

    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }
}
