//! Incremental transcript printer for a line-oriented terminal.
//!
//! The renderer remembers how much of the active session it already wrote and
//! only emits what is new, so a streaming reply appears fragment by fragment.

use crate::core::app::App;
use crate::core::message::{Message, Role};
use crate::core::session::Session;
use crate::core::theme::Theme;

const RESET: &str = "\x1b[0m";

struct Palette {
    user: &'static str,
    model: &'static str,
    dim: &'static str,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Dark => Palette {
            user: "\x1b[1;96m",
            model: "\x1b[1;97m",
            dim: "\x1b[90m",
        },
        Theme::Light => Palette {
            user: "\x1b[1;34m",
            model: "\x1b[1;30m",
            dim: "\x1b[2m",
        },
    }
}

#[derive(Default)]
pub struct TranscriptRenderer {
    color: bool,
    session_id: Option<String>,
    /// Messages written in full.
    done: usize,
    /// Bytes already written of the message at `done`, once its label is out.
    partial: Option<usize>,
}

impl TranscriptRenderer {
    pub fn new(color: bool) -> Self {
        Self {
            color,
            ..Default::default()
        }
    }

    /// Forces the next render to repeat the whole transcript.
    pub fn reset(&mut self) {
        self.session_id = None;
        self.done = 0;
        self.partial = None;
    }

    pub fn render(&mut self, app: &App) -> String {
        let mut out = String::new();
        let palette = palette(app.theme());

        let Some(session) = app.active_session() else {
            if self.session_id.take().is_some() {
                out.push_str(&self.paint(
                    palette.dim,
                    "No chat selected. /new starts one, /chats lists them.\n",
                ));
            }
            self.done = 0;
            self.partial = None;
            return out;
        };

        if self.session_id.as_deref() != Some(session.id.as_str())
            || session.messages.len() < self.done
        {
            self.reset();
            self.session_id = Some(session.id.clone());
            out.push_str(&self.header(session, app, &palette));
        }

        let streaming = app.is_streaming(&session.id);
        let count = session.messages.len();
        for index in self.done..count {
            let message = &session.messages[index];
            if self.partial.is_none() {
                out.push_str(&self.label(message, &palette));
                self.partial = Some(0);
            }
            let written = self.partial.unwrap_or(0);
            out.push_str(unwritten_tail(&message.content, written));

            let still_growing = streaming && index + 1 == count && message.role.is_model();
            if still_growing {
                self.partial = Some(message.content.len());
                break;
            }
            out.push_str("\n\n");
            self.done = index + 1;
            self.partial = None;
        }
        out
    }

    fn header(&self, session: &Session, app: &App, palette: &Palette) -> String {
        let model = app.catalog().resolve(&session.model_id);
        self.paint(
            palette.dim,
            &format!("── {} · {} ──\n\n", session.title, model.name),
        )
    }

    fn label(&self, message: &Message, palette: &Palette) -> String {
        let (color, text) = match message.role {
            Role::User => (palette.user, "You"),
            Role::Model => (palette.model, "Gemini"),
        };
        let mut label = format!("{}:", self.paint(color, text));
        if message.image.is_some() {
            label.push_str(&self.paint(palette.dim, " [image]"));
        }
        label.push('\n');
        label
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.color {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }
}

/// Suffix of `content` past `written` bytes. When the content no longer
/// extends what was written, the whole content is repeated on a new line.
fn unwritten_tail(content: &str, written: usize) -> &str {
    match content.get(written..) {
        Some(tail) => tail,
        None => content,
    }
}
