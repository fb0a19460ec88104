use super::CommandResult;
use crate::ui::state::ChatState;

pub type CommandHandler = fn(&mut ChatState, CommandInvocation<'_>) -> CommandResult;

pub struct Command {
    pub name: &'static str,
    pub usage: &'static str,
    pub help: &'static str,
    pub handler: CommandHandler,
}

#[derive(Clone, Copy)]
pub struct CommandInvocation<'a> {
    pub input: &'a str,
    pub args: &'a str,
}

pub fn all_commands() -> &'static [Command] {
    COMMANDS
}

pub fn find_command(name: &str) -> Option<&'static Command> {
    all_commands()
        .iter()
        .find(|command| command.name.eq_ignore_ascii_case(name))
}

const COMMANDS: &[Command] = &[
    Command {
        name: "help",
        usage: "/help",
        help: "Show available commands.",
        handler: super::handle_help,
    },
    Command {
        name: "new",
        usage: "/new",
        help: "Start a new chat and switch to it.",
        handler: super::handle_new,
    },
    Command {
        name: "chats",
        usage: "/chats",
        help: "List chats, newest first.",
        handler: super::handle_chats,
    },
    Command {
        name: "open",
        usage: "/open <n|id>",
        help: "Switch to a chat by list number or id.",
        handler: super::handle_open,
    },
    Command {
        name: "rename",
        usage: "/rename <title>",
        help: "Rename the current chat.",
        handler: super::handle_rename,
    },
    Command {
        name: "delete",
        usage: "/delete [n|id]",
        help: "Delete a chat (the current one by default).",
        handler: super::handle_delete,
    },
    Command {
        name: "export",
        usage: "/export [--force] [dir]",
        help: "Save the current chat as a text file.",
        handler: super::handle_export,
    },
    Command {
        name: "model",
        usage: "/model [id]",
        help: "Show or change the current chat's model.",
        handler: super::handle_model,
    },
    Command {
        name: "models",
        usage: "/models",
        help: "List available models.",
        handler: super::handle_models,
    },
    Command {
        name: "theme",
        usage: "/theme",
        help: "Toggle between light and dark.",
        handler: super::handle_theme,
    },
    Command {
        name: "attach",
        usage: "/attach <path>",
        help: "Attach an image to the next message.",
        handler: super::handle_attach,
    },
    Command {
        name: "detach",
        usage: "/detach",
        help: "Drop the pending image.",
        handler: super::handle_detach,
    },
    Command {
        name: "listen",
        usage: "/listen",
        help: "Dictate the next message, when speech input is available.",
        handler: super::handle_listen,
    },
    Command {
        name: "quit",
        usage: "/quit",
        help: "Leave OmniChat.",
        handler: super::handle_quit,
    },
];
