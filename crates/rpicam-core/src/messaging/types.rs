use crate::commands::{COMMAND_CAPTURE, COMMAND_HELP, COMMAND_STATUS};

/// Outgoing "chat action" (presence indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadPhoto,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ParseMode {
    #[default]
    Markdown,
}

/// Persistent reply keyboard shown under the input field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyKeyboard {
    pub rows: Vec<Vec<String>>,
    pub resize: bool,
}

impl ReplyKeyboard {
    /// `/capture` on its own row, then `/status` and `/help`.
    pub fn commands() -> Self {
        Self {
            rows: vec![
                vec![COMMAND_CAPTURE.to_string()],
                vec![COMMAND_STATUS.to_string(), COMMAND_HELP.to_string()],
            ],
            resize: true,
        }
    }
}

/// Options attached to every reply, text or photo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyOptions {
    pub keyboard: Option<ReplyKeyboard>,
    pub parse_mode: ParseMode,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            keyboard: Some(ReplyKeyboard::commands()),
            parse_mode: ParseMode::Markdown,
        }
    }
}
