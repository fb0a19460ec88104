mod registry;

pub use registry::{all_commands, find_command, CommandInvocation};

use std::path::PathBuf;

use crate::core::export::ExportError;
use crate::core::models::Provider;
use crate::ui::state::ChatState;

pub enum CommandResult {
    Continue,
    ProcessAsMessage(String),
    AttachImage(PathBuf),
    Listen,
    Exit,
}

pub fn process_input(state: &mut ChatState, input: &str) -> CommandResult {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return CommandResult::ProcessAsMessage(input.to_string());
    }

    let mut parts = trimmed[1..].splitn(2, ' ');
    let command_name = match parts.next() {
        Some(name) if !name.is_empty() => name,
        _ => return CommandResult::ProcessAsMessage(input.to_string()),
    };
    let args = parts.next().unwrap_or("").trim();

    match find_command(command_name) {
        Some(command) => (command.handler)(
            state,
            CommandInvocation {
                input: trimmed,
                args,
            },
        ),
        None => {
            state.notice(format!(
                "Unknown command /{command_name}. Type /help for the list."
            ));
            CommandResult::Continue
        }
    }
}

/// Resolves a 1-based position in the `/chats` listing or a literal id.
fn resolve_session_ref(state: &ChatState, reference: &str) -> Option<String> {
    let sessions = state.app.sessions();
    if let Ok(position) = reference.parse::<usize>() {
        if let Some(session) = position.checked_sub(1).and_then(|i| sessions.get(i)) {
            return Some(session.id.clone());
        }
    }
    sessions
        .iter()
        .find(|session| session.id == reference)
        .map(|session| session.id.clone())
}

fn active_or_notice(state: &mut ChatState) -> Option<String> {
    let active = state.app.active_session_id().map(str::to_owned);
    if active.is_none() {
        state.notice("No chat selected. Use /new or /open first.");
    }
    active
}

pub(super) fn handle_help(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    let mut help = String::from("Commands:");
    for command in all_commands() {
        help.push_str(&format!("\n  {:<26} {}", command.usage, command.help));
    }
    help.push_str("\nAnything else is sent to the current chat.");
    state.notice(help);
    CommandResult::Continue
}

pub(super) fn handle_new(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    match state.app.create_session() {
        Ok(_) => state.notice("Started a new chat."),
        Err(e) => state.notice(format!("Could not create chat: {e}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_chats(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    let active = state.app.active_session_id().map(str::to_owned);
    let lines: Vec<String> = state
        .app
        .sessions()
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let marker = if active.as_deref() == Some(session.id.as_str()) {
                '*'
            } else {
                ' '
            };
            let streaming = if state.app.is_streaming(&session.id) {
                " (answering)"
            } else {
                ""
            };
            format!(
                "{marker} {:>2}. {} [{} messages]{streaming}",
                index + 1,
                session.title,
                session.messages.len()
            )
        })
        .collect();

    if lines.is_empty() {
        state.notice("No chats yet. Use /new to start one.");
    } else {
        state.notice(lines.join("\n"));
    }
    CommandResult::Continue
}

pub(super) fn handle_open(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        state.notice("Usage: /open <n|id>");
        return CommandResult::Continue;
    }
    match resolve_session_ref(state, invocation.args) {
        Some(id) => {
            state.app.select_session(&id);
        }
        None => state.notice(format!("No chat matches '{}'.", invocation.args)),
    }
    CommandResult::Continue
}

pub(super) fn handle_rename(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        state.notice("Usage: /rename <title>");
        return CommandResult::Continue;
    }
    let Some(id) = active_or_notice(state) else {
        return CommandResult::Continue;
    };
    match state.app.rename_session(&id, invocation.args) {
        Ok(true) => state.notice(format!("Renamed to '{}'.", invocation.args)),
        Ok(false) => {}
        Err(e) => state.notice(format!("Could not rename chat: {e}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_delete(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    let target = if invocation.args.is_empty() {
        active_or_notice(state)
    } else {
        let found = resolve_session_ref(state, invocation.args);
        if found.is_none() {
            state.notice(format!("No chat matches '{}'.", invocation.args));
        }
        found
    };
    let Some(id) = target else {
        return CommandResult::Continue;
    };

    let title = state
        .app
        .session(&id)
        .map(|session| session.title.clone())
        .unwrap_or_default();
    match state.app.delete_session(&id) {
        Ok(true) => state.notice(format!("Deleted '{title}'.")),
        Ok(false) => {}
        Err(e) => state.notice(format!("Could not delete chat: {e}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_export(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    let mut overwrite = false;
    let mut dir: Option<PathBuf> = None;
    for arg in invocation.args.split_whitespace() {
        if arg == "--force" {
            overwrite = true;
        } else {
            dir = Some(PathBuf::from(arg));
        }
    }
    let dir = dir.unwrap_or_else(|| state.export_dir.clone());

    let Some(id) = active_or_notice(state) else {
        return CommandResult::Continue;
    };
    match state.app.export_session(&id, &dir, overwrite) {
        Ok(Some(path)) => state.notice(format!("Exported to {}.", path.display())),
        Ok(None) => {}
        Err(e @ ExportError::Exists(_)) => {
            state.notice(format!("{e}. Use /export --force to overwrite."))
        }
        Err(e) => state.notice(e.to_string()),
    }
    CommandResult::Continue
}

pub(super) fn handle_model(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    let Some(id) = active_or_notice(state) else {
        return CommandResult::Continue;
    };

    if invocation.args.is_empty() {
        if let Some(session) = state.app.session(&id) {
            let summary = state.app.catalog().resolve(&session.model_id).summary();
            state.notice(summary);
        }
        return CommandResult::Continue;
    }

    match state.app.set_session_model(&id, invocation.args) {
        Ok(true) => {
            let name = state.app.catalog().resolve(invocation.args).name.clone();
            state.notice(format!("Model set to {name}."));
        }
        Ok(false) => state.notice(format!(
            "Unknown model '{}'. Type /models for the list.",
            invocation.args
        )),
        Err(e) => state.notice(format!("Could not change model: {e}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_models(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    let catalog = state.app.catalog();
    let mut listing = String::new();
    for (provider, models) in catalog.by_provider() {
        if !listing.is_empty() {
            listing.push('\n');
        }
        listing.push_str(provider_heading(provider));
        for model in models {
            let vision = if model.vision { " (vision)" } else { "" };
            listing.push_str(&format!("\n  {:<36} {}{vision}", model.id, model.name));
        }
    }
    state.notice(listing);
    CommandResult::Continue
}

fn provider_heading(provider: Provider) -> &'static str {
    match provider {
        Provider::Gemini => "Gemini:",
    }
}

pub(super) fn handle_theme(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    match state.app.toggle_theme() {
        Ok(theme) => state.notice(format!("Theme: {theme}.")),
        Err(e) => state.notice(format!("Could not save theme: {e}")),
    }
    CommandResult::Continue
}

pub(super) fn handle_attach(state: &mut ChatState, invocation: CommandInvocation<'_>) -> CommandResult {
    if invocation.args.is_empty() {
        state.notice("Usage: /attach <path>");
        return CommandResult::Continue;
    }
    CommandResult::AttachImage(PathBuf::from(invocation.args))
}

pub(super) fn handle_detach(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    match state.attachment.take() {
        Some(pending) => state.notice(format!("Removed {}.", pending.path.display())),
        None => state.notice("No image attached."),
    }
    CommandResult::Continue
}

pub(super) fn handle_listen(state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    if !state.speech_available {
        state.notice("Speech input is not available in this terminal.");
        return CommandResult::Continue;
    }
    CommandResult::Listen
}

pub(super) fn handle_quit(_state: &mut ChatState, _invocation: CommandInvocation<'_>) -> CommandResult {
    CommandResult::Exit
}
