//! Modal sub-flows. Exactly one may be open; each variant carries only its own state.
//!
//! Every modal can be cancelled from any step without issuing a command.
//! Destructive confirms are gated by arm-then-confirm or an exact-text match.

mod confirm;
mod delete;
mod sync;
mod wizard;

pub use confirm::{RollbackModal, TerminateModal};
pub use delete::DeleteModal;
pub use sync::{SyncModal, SyncPreview};
pub use wizard::{Choices, Step, Wizard, WizardKind};

use crate::keys::Key;
use crate::msg::Command;

/// What a modal wants the session to do after a key or completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Stay,
    Hint(String),
    Issue(Command),
    Close(Option<String>),
}

#[derive(Debug, Clone, Default)]
pub enum Modal {
    #[default]
    None,
    Delete(DeleteModal),
    Create(Wizard),
    Edit(Wizard),
    Sync(SyncModal),
    Rollback(RollbackModal),
    Terminate(TerminateModal),
}

impl Modal {
    pub fn is_open(&self) -> bool {
        !matches!(self, Modal::None)
    }

    /// Ticket of the open modal; completions carrying any other ticket are stale.
    pub fn ticket(&self) -> Option<u64> {
        match self {
            Modal::None => None,
            Modal::Delete(m) => Some(m.ticket),
            Modal::Create(w) | Modal::Edit(w) => Some(w.ticket),
            Modal::Sync(m) => Some(m.ticket),
            Modal::Rollback(m) => Some(m.ticket),
            Modal::Terminate(m) => Some(m.ticket),
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Modal::None => "",
            Modal::Delete(_) => "Delete application",
            Modal::Create(_) => "Create application",
            Modal::Edit(_) => "Edit application",
            Modal::Sync(_) => "Sync",
            Modal::Rollback(_) => "Rollback",
            Modal::Terminate(_) => "Terminate operation",
        }
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        match self {
            Modal::None => Outcome::Stay,
            Modal::Delete(m) => m.handle_key(key),
            Modal::Create(w) | Modal::Edit(w) => w.handle_key(key),
            Modal::Sync(m) => m.handle_key(key),
            Modal::Rollback(m) => m.handle_key(key),
            Modal::Terminate(m) => m.handle_key(key),
        }
    }
}
