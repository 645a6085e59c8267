//! Command table: message text → what the dispatcher should do.

use crate::{session::SessionStatus, status::StatusProvider};

pub const COMMAND_START: &str = "/start";
pub const COMMAND_CAPTURE: &str = "/capture";
pub const COMMAND_STATUS: &str = "/status";
pub const COMMAND_HELP: &str = "/help";

pub const MESSAGE_DEFAULT: &str = "Input your command:";
pub const MESSAGE_UNKNOWN_COMMAND: &str = "Unknown command";

const HELP_TEXT: &str = "
Following commands are supported:

*For Raspberry Pi Camera Module*

/capture : capture a still image with *raspistill*

*Others*

/status : show this bot's status
/help : show this help message
";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    Capture,
    Status,
    Help,
    Unknown,
}

impl Command {
    /// Prefix match, first hit wins (so `/capture@my_bot` and `/statusfoo` match too).
    pub fn parse(text: &str) -> Self {
        const TABLE: [(&str, Command); 4] = [
            (COMMAND_START, Command::Start),
            (COMMAND_CAPTURE, Command::Capture),
            (COMMAND_STATUS, Command::Status),
            (COMMAND_HELP, Command::Help),
        ];

        TABLE
            .iter()
            .find(|(prefix, _)| text.starts_with(prefix))
            .map(|(_, cmd)| *cmd)
            .unwrap_or(Command::Unknown)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Send this text (markdown) with the reply keyboard.
    Reply(String),
    /// Take a picture and send it as a photo instead of text.
    Capture,
}

/// Router output: the side effect to perform and the state to move to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub next: SessionStatus,
}

/// Decide the reply for `text` given the session's current state.
pub fn route(status: SessionStatus, text: &str, introspect: &dyn StatusProvider) -> Decision {
    let text = text.trim();
    match status {
        SessionStatus::Waiting => {
            let action = match Command::parse(text) {
                Command::Start => Action::Reply(MESSAGE_DEFAULT.to_string()),
                Command::Capture => Action::Capture,
                Command::Status => Action::Reply(status_text(introspect)),
                Command::Help => Action::Reply(help_text().to_string()),
                Command::Unknown => Action::Reply(unknown_command_text(text)),
            };
            Decision {
                action,
                next: SessionStatus::Waiting,
            }
        }
    }
}

pub fn help_text() -> &'static str {
    HELP_TEXT
}

pub fn status_text(introspect: &dyn StatusProvider) -> String {
    format!(
        "Uptime: {}\nMemory Usage: {}",
        introspect.uptime(),
        introspect.memory_usage()
    )
}

pub fn unknown_command_text(text: &str) -> String {
    format!("*{text}*: {MESSAGE_UNKNOWN_COMMAND}")
}
