use super::Outcome;
use crate::input::TextInput;
use crate::keys::Key;
use crate::msg::Command;

/// Delete requires typing the application name exactly. Tab toggles cascade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteModal {
    pub ticket: u64,
    pub target: String,
    pub input: TextInput,
    pub cascade: bool,
    pub deleting: bool,
    pub error: Option<String>,
}

impl DeleteModal {
    pub(crate) fn open(ticket: u64, target: String) -> Self {
        Self { ticket, target, input: TextInput::default(), cascade: false, deleting: false, error: None }
    }

    /// Byte-for-byte; no trimming or case folding.
    pub fn confirmed(&self) -> bool {
        self.input.value() == self.target
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        match key {
            Key::Esc => Outcome::Close(Some("delete cancelled".into())),
            Key::Tab => {
                self.cascade = !self.cascade;
                Outcome::Stay
            }
            Key::Enter if self.deleting => Outcome::Hint("delete in progress".into()),
            Key::Enter if self.confirmed() => {
                self.deleting = true;
                self.error = None;
                Outcome::Issue(Command::Delete { ticket: self.ticket, name: self.target.clone(), cascade: self.cascade })
            }
            Key::Enter => Outcome::Hint("type the exact application name to confirm".into()),
            other => {
                if !self.deleting {
                    self.input.edit(other);
                }
                Outcome::Stay
            }
        }
    }

    pub(crate) fn on_done(&mut self, result: Result<(), argonav_api::ApiError>) -> Outcome {
        self.deleting = false;
        match result {
            Ok(()) => Outcome::Close(Some(format!("deleted {}", self.target))),
            Err(e) => {
                self.error = Some(e.to_string());
                Outcome::Stay
            }
        }
    }
}
