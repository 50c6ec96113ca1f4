//! Arm-then-confirm flows: Enter arms, `y` confirms.

use argonav_api::ApiError;
use argonav_core::{OperationState, Revision};

use super::Outcome;
use crate::keys::Key;
use crate::msg::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackModal {
    pub ticket: u64,
    pub app: String,
    pub revisions: Vec<Revision>,
    pub loading: bool,
    pub cursor: usize,
    pub armed: bool,
    pub running: bool,
    pub error: Option<String>,
}

impl RollbackModal {
    pub(crate) fn open(ticket: u64, app: String) -> (Self, Command) {
        let cmd = Command::LoadRevisions { ticket, name: app.clone() };
        let modal = Self {
            ticket,
            app,
            revisions: Vec::new(),
            loading: true,
            cursor: 0,
            armed: false,
            running: false,
            error: None,
        };
        (modal, cmd)
    }

    pub fn selected(&self) -> Option<&Revision> {
        self.revisions.get(self.cursor)
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        if let Some(delta) = key.vertical() {
            if !self.running && !self.revisions.is_empty() {
                let next = self.cursor.saturating_add_signed(delta).min(self.revisions.len() - 1);
                if next != self.cursor {
                    self.cursor = next;
                    self.armed = false;
                }
            }
            return Outcome::Stay;
        }
        match key {
            Key::Esc | Key::Char('n') => Outcome::Close(Some("rollback cancelled".into())),
            Key::Enter if self.loading => Outcome::Hint("loading revisions".into()),
            Key::Enter if self.running => Outcome::Hint("rollback in progress".into()),
            Key::Enter => match self.selected() {
                Some(rev) => {
                    let hint = format!("press y to roll back {} to {} ({})", self.app, rev.id, short(&rev.revision));
                    self.armed = true;
                    Outcome::Hint(hint)
                }
                None => Outcome::Hint("no revisions to roll back to".into()),
            },
            Key::Char('y') if self.running => Outcome::Hint("rollback in progress".into()),
            Key::Char('y') if !self.armed => Outcome::Hint("press enter to arm the rollback first".into()),
            Key::Char('y') => match self.selected().map(|r| r.id) {
                Some(revision_id) => {
                    self.running = true;
                    self.error = None;
                    Outcome::Issue(Command::Rollback { ticket: self.ticket, name: self.app.clone(), revision_id })
                }
                None => Outcome::Stay,
            },
            _ => Outcome::Stay,
        }
    }

    pub(crate) fn on_revisions(&mut self, result: Result<Vec<Revision>, ApiError>) {
        self.loading = false;
        self.cursor = 0;
        self.armed = false;
        match result {
            Ok(revs) => self.revisions = revs,
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub(crate) fn on_done(&mut self, result: Result<(), ApiError>) -> Outcome {
        self.running = false;
        self.armed = false;
        match result {
            Ok(()) => {
                let rev = self.selected().map(|r| r.id).unwrap_or_default();
                Outcome::Close(Some(format!("rolled back {} to revision {}", self.app, rev)))
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Outcome::Stay
            }
        }
    }
}

/// Only opened when the application has an operation in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateModal {
    pub ticket: u64,
    pub app: String,
    pub operation: OperationState,
    pub armed: bool,
    pub running: bool,
    pub error: Option<String>,
}

impl TerminateModal {
    pub(crate) fn open(ticket: u64, app: String, operation: OperationState) -> Self {
        Self { ticket, app, operation, armed: false, running: false, error: None }
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        match key {
            Key::Esc | Key::Char('n') => Outcome::Close(Some("terminate cancelled".into())),
            Key::Enter | Key::Char('y') if self.running => Outcome::Hint("terminate in progress".into()),
            Key::Enter => {
                self.armed = true;
                Outcome::Hint(format!("press y to terminate the {} operation on {}", self.operation.phase, self.app))
            }
            Key::Char('y') if !self.armed => Outcome::Hint("press enter to arm first".into()),
            Key::Char('y') => {
                self.running = true;
                self.error = None;
                Outcome::Issue(Command::Terminate { ticket: self.ticket, name: self.app.clone() })
            }
            _ => Outcome::Stay,
        }
    }

    pub(crate) fn on_done(&mut self, result: Result<(), ApiError>) -> Outcome {
        self.running = false;
        self.armed = false;
        match result {
            Ok(()) => Outcome::Close(Some(format!("terminated operation on {}", self.app))),
            Err(e) => {
                self.error = Some(e.to_string());
                Outcome::Stay
            }
        }
    }
}

fn short(rev: &str) -> &str {
    rev.get(..8).unwrap_or(rev)
}
