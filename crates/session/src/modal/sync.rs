use argonav_core::Resource;

use super::Outcome;
use crate::keys::Key;
use crate::msg::{Command, SyncOutcome};

/// Drifted resources for one target, shown before anything is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPreview {
    pub name: String,
    pub drifted: Vec<Resource>,
}

/// Two-phase sync: a dry-run batch runs on open; the real batch needs it finished first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncModal {
    pub ticket: u64,
    pub targets: Vec<String>,
    pub preview: Vec<SyncPreview>,
    pub dry_run_complete: bool,
    pub syncing: bool,
    pub results: Vec<SyncOutcome>,
    pub error: Option<String>,
}

impl SyncModal {
    pub(crate) fn open(ticket: u64, targets: Vec<String>, preview: Vec<SyncPreview>) -> (Self, Command) {
        let cmd = Command::SyncBatch { ticket, targets: targets.clone(), dry_run: true };
        let modal = Self {
            ticket,
            targets,
            preview,
            dry_run_complete: false,
            syncing: false,
            results: Vec::new(),
            error: None,
        };
        (modal, cmd)
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> Outcome {
        match key {
            Key::Esc | Key::Char('n') => Outcome::Close(Some("sync cancelled".into())),
            Key::Char('y') if !self.dry_run_complete => Outcome::Hint("dry-run still running".into()),
            Key::Char('y') if self.syncing => Outcome::Hint("sync in progress".into()),
            Key::Char('y') => {
                self.syncing = true;
                self.error = None;
                Outcome::Issue(Command::SyncBatch { ticket: self.ticket, targets: self.targets.clone(), dry_run: false })
            }
            _ => Outcome::Stay,
        }
    }

    pub(crate) fn on_finished(&mut self, dry_run: bool, results: Vec<SyncOutcome>) -> Outcome {
        let failed = results.iter().filter(|r| !r.is_ok()).count();
        let total = results.len();
        self.results = results;
        if dry_run {
            self.dry_run_complete = true;
            if failed > 0 {
                self.error = Some(format!("dry-run failed for {} of {}", failed, total));
            }
            return Outcome::Stay;
        }
        self.syncing = false;
        if failed == 0 {
            return Outcome::Close(Some(format!("sync started for {} application(s)", total)));
        }
        self.error = Some(format!("sync failed for {} of {}", failed, total));
        Outcome::Stay
    }
}
