//! The transition function. [`Session::update`] is the only place state changes.

use argonav_api::ApiError;
use argonav_core::{Application, Resource};
use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::input::TextInput;
use crate::keys::Key;
use crate::modal::{DeleteModal, Modal, Outcome, RollbackModal, SyncModal, SyncPreview, TerminateModal, Wizard};
use crate::msg::{Command, Msg};
use crate::overlay::{DiffView, EventsView, HistoryView, LogView, Overlay, OverlayAction, ResourceView};
use crate::projection::{window_offset, Projection};

/// Terminal rows taken by header, footer and borders.
pub const CHROME_ROWS: u16 = 6;

/// Default cap on buffered log lines per overlay.
pub const DEFAULT_LOG_BACKLOG: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub log_backlog: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { log_backlog: DEFAULT_LOG_BACKLOG }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Focus {
    #[default]
    Apps,
    Resources,
}

#[derive(Debug, Default)]
pub struct Session {
    pub projection: Projection,
    /// Last loaded detail for the selected application. Kept apart from the list.
    pub detail: Option<Application>,
    pub focus: Focus,
    pub resource_sel: usize,
    pub resource_offset: usize,
    pub modal: Modal,
    pub overlay: Option<Overlay>,
    pub status: String,
    /// Shown instead of the main screen until the first list load succeeds.
    pub error_page: Option<String>,
    pub loaded_once: bool,
    /// Some while the filter prompt is open.
    pub filter: Option<TextInput>,
    pub last_refresh: Option<DateTime<Local>>,
    pub options: SessionOptions,
    quit: bool,
    list_issued: u64,
    detail_issued: u64,
    next_id: u64,
}

impl Session {
    pub fn new(options: SessionOptions) -> Self {
        Self { options, ..Default::default() }
    }

    /// Commands to run at startup.
    pub fn init(&mut self) -> Vec<Command> {
        self.status = "loading applications".into();
        vec![self.load_list()]
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn selected(&self) -> Option<&Application> {
        self.projection.selected()
    }

    /// Detail for the selected application if loaded, else its list entry.
    pub fn current(&self) -> Option<&Application> {
        let selected = self.projection.selected()?;
        match &self.detail {
            Some(d) if d.name == selected.name => Some(d),
            _ => Some(selected),
        }
    }

    /// Resources of the loaded detail; empty until it arrives.
    pub fn resources(&self) -> &[Resource] {
        self.detail.as_ref().map(|d| d.resources.as_slice()).unwrap_or_default()
    }

    pub fn selected_resource(&self) -> Option<&Resource> {
        self.resources().get(self.resource_sel)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn load_list(&mut self) -> Command {
        self.list_issued += 1;
        Command::LoadApplications { generation: self.list_issued }
    }

    fn load_detail(&mut self, hard: bool) -> Option<Command> {
        let name = self.projection.selected_name()?;
        self.detail_issued += 1;
        Some(Command::LoadDetail { generation: self.detail_issued, name, hard })
    }

    pub fn update(&mut self, msg: Msg) -> Vec<Command> {
        match msg {
            Msg::Key(key) => self.on_key(key),
            Msg::Resize { height, .. } => {
                self.projection.set_visible_rows(height.saturating_sub(CHROME_ROWS) as usize);
                self.clamp_resources();
                Vec::new()
            }
            Msg::AppsLoaded { generation, result } => self.on_apps(generation, result),
            Msg::DetailLoaded { generation, name, result } => {
                let current = generation == self.detail_issued
                    && self.projection.selected().is_some_and(|a| a.name == name);
                if !current {
                    debug!(generation, app = %name, "dropping stale detail");
                    return Vec::new();
                }
                match result {
                    Ok(app) => {
                        self.detail = Some(app);
                        self.clamp_resources();
                    }
                    Err(e) => self.status = format!("load {name} failed: {e}"),
                }
                Vec::new()
            }
            Msg::SyncFinished { ticket, dry_run, results } => {
                let mut cmds = Vec::new();
                if let Modal::Sync(m) = &mut self.modal {
                    if m.ticket == ticket {
                        let outcome = m.on_finished(dry_run, results);
                        cmds.extend(self.apply(outcome));
                    }
                }
                if !dry_run {
                    cmds.push(self.load_list());
                }
                cmds
            }
            Msg::RevisionsLoaded { ticket, result } => {
                if let Modal::Rollback(m) = &mut self.modal {
                    if m.ticket == ticket {
                        m.on_revisions(result);
                    }
                }
                Vec::new()
            }
            Msg::RollbackDone { ticket, result } => {
                let ok = result.is_ok();
                let mut cmds = match &mut self.modal {
                    Modal::Rollback(m) if m.ticket == ticket => {
                        let outcome = m.on_done(result);
                        self.apply(outcome)
                    }
                    _ => Vec::new(),
                };
                if ok {
                    cmds.extend(self.reload_all());
                }
                cmds
            }
            Msg::TerminateDone { ticket, result } => {
                let ok = result.is_ok();
                let mut cmds = match &mut self.modal {
                    Modal::Terminate(m) if m.ticket == ticket => {
                        let outcome = m.on_done(result);
                        self.apply(outcome)
                    }
                    _ => Vec::new(),
                };
                if ok {
                    cmds.extend(self.reload_all());
                }
                cmds
            }
            Msg::DeleteDone { ticket, result } => {
                let ok = result.is_ok();
                let mut cmds = match &mut self.modal {
                    Modal::Delete(m) if m.ticket == ticket => {
                        let outcome = m.on_done(result);
                        self.apply(outcome)
                    }
                    _ => Vec::new(),
                };
                if ok {
                    cmds.push(self.load_list());
                }
                cmds
            }
            Msg::ChoicesLoaded { ticket, projects, repositories, clusters } => {
                if let Modal::Create(w) | Modal::Edit(w) = &mut self.modal {
                    if w.ticket == ticket {
                        w.on_choices(projects, repositories, clusters);
                    }
                }
                Vec::new()
            }
            Msg::CreateDone { ticket, result } => {
                let ok = result.is_ok();
                let mut cmds = match &mut self.modal {
                    Modal::Create(w) if w.ticket == ticket => {
                        let outcome = w.on_done(result);
                        self.apply(outcome)
                    }
                    _ => Vec::new(),
                };
                if ok {
                    cmds.push(self.load_list());
                }
                cmds
            }
            Msg::UpdateDone { ticket, result } => {
                let ok = result.is_ok();
                let mut cmds = match &mut self.modal {
                    Modal::Edit(w) if w.ticket == ticket => {
                        let outcome = w.on_done(result);
                        self.apply(outcome)
                    }
                    _ => Vec::new(),
                };
                if ok {
                    cmds.extend(self.reload_all());
                }
                cmds
            }
            Msg::ResourceLoaded { ticket, live, desired } => {
                if let Some(Overlay::Resource(v)) = &mut self.overlay {
                    if v.ticket == ticket {
                        v.on_loaded(live, desired);
                    }
                }
                Vec::new()
            }
            Msg::EventsLoaded { ticket, result } => {
                if let Some(Overlay::Events(v)) = &mut self.overlay {
                    if v.ticket == ticket {
                        v.on_loaded(result);
                    }
                }
                Vec::new()
            }
            Msg::DiffLoaded { ticket, result } => {
                if let Some(Overlay::Diff(v)) = &mut self.overlay {
                    if v.ticket == ticket {
                        v.on_loaded(result);
                    }
                }
                Vec::new()
            }
            Msg::LogLine { stream_id, line } => {
                if let Some(v) = self.log_view(stream_id) {
                    v.push(line);
                }
                Vec::new()
            }
            Msg::LogFailed { stream_id, error } => {
                if let Some(v) = self.log_view(stream_id) {
                    v.on_failed(error);
                }
                Vec::new()
            }
            Msg::LogEnded { stream_id } => {
                if let Some(v) = self.log_view(stream_id) {
                    v.ended = true;
                }
                Vec::new()
            }
        }
    }

    fn log_view(&mut self, stream_id: u64) -> Option<&mut LogView> {
        match &mut self.overlay {
            Some(Overlay::Logs(v)) if v.stream_id == stream_id => Some(v),
            _ => None,
        }
    }

    fn on_apps(&mut self, generation: u64, result: Result<Vec<Application>, ApiError>) -> Vec<Command> {
        if generation != self.list_issued {
            debug!(generation, latest = self.list_issued, "dropping stale application list");
            return Vec::new();
        }
        match result {
            Ok(apps) => {
                info!(generation, count = apps.len(), "applications loaded");
                self.loaded_once = true;
                self.error_page = None;
                self.last_refresh = Some(Local::now());
                self.status = format!("loaded {} applications", apps.len());
                let changed = self.projection.ingest(apps);
                self.after_recompute(changed)
            }
            Err(e) if !self.loaded_once => {
                warn!(error = %e, "initial application load failed");
                self.error_page = Some(error_page(&e));
                self.status = e.to_string();
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "application refresh failed");
                self.status = format!("refresh failed: {e}");
                Vec::new()
            }
        }
    }

    /// Follow-up after the view was recomputed or the cursor moved.
    fn after_recompute(&mut self, selection_changed: bool) -> Vec<Command> {
        if self.projection.view_len() == 0 {
            self.detail = None;
            self.focus = Focus::Apps;
            self.resource_sel = 0;
            self.resource_offset = 0;
            return self.close_overlay();
        }
        if !selection_changed {
            return Vec::new();
        }
        self.detail = None;
        self.focus = Focus::Apps;
        self.resource_sel = 0;
        self.resource_offset = 0;
        self.load_detail(false).into_iter().collect()
    }

    fn reload_all(&mut self) -> Vec<Command> {
        let mut cmds = vec![self.load_list()];
        cmds.extend(self.load_detail(false));
        cmds
    }

    fn clamp_resources(&mut self) {
        let len = self.resources().len();
        self.resource_sel = self.resource_sel.min(len.saturating_sub(1));
        self.resource_offset =
            window_offset(self.resource_sel, self.resource_offset, len, self.projection.visible_rows());
        if len == 0 && self.focus == Focus::Resources {
            self.focus = Focus::Apps;
        }
    }

    fn apply(&mut self, outcome: Outcome) -> Vec<Command> {
        match outcome {
            Outcome::Stay => Vec::new(),
            Outcome::Hint(hint) => {
                self.status = hint;
                Vec::new()
            }
            Outcome::Issue(cmd) => {
                if cmd.is_mutating() {
                    info!(kind = cmd.kind(), "mutating command confirmed");
                }
                vec![cmd]
            }
            Outcome::Close(message) => {
                self.modal = Modal::None;
                if let Some(message) = message {
                    self.status = message;
                }
                Vec::new()
            }
        }
    }

    fn open_overlay(&mut self, overlay: Overlay) -> Vec<Command> {
        let cmds = self.close_overlay();
        self.overlay = Some(overlay);
        cmds
    }

    /// Closing a log overlay cancels its subscription.
    fn close_overlay(&mut self) -> Vec<Command> {
        match self.overlay.take() {
            Some(Overlay::Logs(v)) => vec![Command::CancelLogStream { stream_id: v.stream_id }],
            _ => Vec::new(),
        }
    }

    fn on_key(&mut self, key: Key) -> Vec<Command> {
        if key == Key::Ctrl('c') {
            self.quit = true;
            return self.close_overlay();
        }
        if self.modal.is_open() {
            let outcome = self.modal.handle_key(key);
            return self.apply(outcome);
        }
        if let Some(input) = self.filter.clone() {
            return self.on_filter_key(input, key);
        }
        if let Some(overlay) = self.overlay.as_mut() {
            return match overlay.handle_key(key) {
                OverlayAction::Stay => Vec::new(),
                OverlayAction::Close => self.close_overlay(),
                OverlayAction::Hint(hint) => {
                    self.status = hint;
                    Vec::new()
                }
                OverlayAction::ToggleFollow => self.toggle_follow(),
            };
        }
        self.on_base_key(key)
    }

    fn on_filter_key(&mut self, mut input: TextInput, key: Key) -> Vec<Command> {
        match key {
            Key::Enter => {
                self.filter = None;
                Vec::new()
            }
            Key::Esc => {
                self.filter = None;
                let changed = self.projection.set_query("");
                self.after_recompute(changed)
            }
            other => {
                if !input.edit(other) {
                    return Vec::new();
                }
                let changed = self.projection.set_query(input.value());
                self.filter = Some(input);
                self.after_recompute(changed)
            }
        }
    }

    fn on_base_key(&mut self, key: Key) -> Vec<Command> {
        if let Some(delta) = key.vertical() {
            return self.move_cursor(delta);
        }
        match key {
            Key::Char('q') => {
                self.quit = true;
                Vec::new()
            }
            Key::Char('r') => {
                self.status = "refreshing".into();
                vec![self.load_list()]
            }
            Key::Char('g') | Key::Char('R') => {
                let hard = key == Key::Char('R');
                match self.load_detail(hard) {
                    Some(cmd) => {
                        self.status = if hard { "hard refresh requested".into() } else { "refreshing details".into() };
                        vec![cmd]
                    }
                    None => self.hint("no application selected"),
                }
            }
            Key::Char('D') => {
                let on = !self.projection.drift_only();
                let changed = self.projection.set_drift_only(on);
                self.status = if on { "showing drifted only".into() } else { "showing all".into() };
                self.after_recompute(changed)
            }
            Key::Char('S') => {
                let changed = self.projection.cycle_sort();
                self.status = format!("sort: {}", self.projection.sort().label());
                self.after_recompute(changed)
            }
            Key::Char('/') => {
                self.filter = Some(TextInput::with_value(self.projection.query()));
                Vec::new()
            }
            Key::Esc if !self.projection.query().is_empty() => {
                let changed = self.projection.set_query("");
                self.after_recompute(changed)
            }
            Key::Char('?') => self.open_overlay(Overlay::Help),
            Key::Tab => self.toggle_focus(),
            Key::Enter | Key::Char('v') => self.open_resource(),
            Key::Char('l') => self.open_logs(),
            Key::Char('d') => self.open_diff(),
            Key::Char('h') => self.open_history(),
            Key::Char('E') => self.open_events(),
            Key::Char('s') => {
                let targets = self.projection.drifted_names();
                if targets.is_empty() {
                    return self.hint("nothing to sync");
                }
                self.open_sync(targets)
            }
            Key::Char('y') => match self.projection.selected_name() {
                Some(name) => self.open_sync(vec![name]),
                None => self.hint("no application selected"),
            },
            Key::Char('b') => match self.projection.selected_name() {
                Some(name) => {
                    let ticket = self.next_id();
                    let (modal, cmd) = RollbackModal::open(ticket, name);
                    self.modal = Modal::Rollback(modal);
                    vec![cmd]
                }
                None => self.hint("no application selected"),
            },
            Key::Char('x') => {
                let Some(app) = self.current() else {
                    return self.hint("no application selected");
                };
                let Some(op) = app.operation_state.clone() else {
                    return self.hint("no operation in progress");
                };
                let name = app.name.clone();
                let ticket = self.next_id();
                self.modal = Modal::Terminate(TerminateModal::open(ticket, name, op));
                Vec::new()
            }
            Key::Ctrl('d') | Key::Delete => match self.projection.selected_name() {
                Some(name) => {
                    let ticket = self.next_id();
                    self.modal = Modal::Delete(DeleteModal::open(ticket, name));
                    Vec::new()
                }
                None => self.hint("no application selected"),
            },
            Key::Char('c') => {
                let ticket = self.next_id();
                let (wizard, cmd) = Wizard::create(ticket);
                self.modal = Modal::Create(wizard);
                vec![cmd]
            }
            Key::Char('e') => {
                let Some(app) = self.current().cloned() else {
                    return self.hint("no application selected");
                };
                let ticket = self.next_id();
                let (wizard, cmd) = Wizard::edit(ticket, &app);
                self.modal = Modal::Edit(wizard);
                vec![cmd]
            }
            _ => Vec::new(),
        }
    }

    fn hint(&mut self, hint: &str) -> Vec<Command> {
        self.status = hint.to_string();
        Vec::new()
    }

    fn move_cursor(&mut self, delta: isize) -> Vec<Command> {
        match self.focus {
            Focus::Apps => {
                let changed = self.projection.move_by(delta);
                self.after_recompute(changed)
            }
            Focus::Resources => {
                let len = self.resources().len();
                if len > 0 {
                    self.resource_sel = self.resource_sel.saturating_add_signed(delta).min(len - 1);
                    self.clamp_resources();
                }
                Vec::new()
            }
        }
    }

    fn toggle_focus(&mut self) -> Vec<Command> {
        match self.focus {
            Focus::Resources => self.focus = Focus::Apps,
            Focus::Apps if self.resources().is_empty() => return self.hint("no resources loaded"),
            Focus::Apps => self.focus = Focus::Resources,
        }
        Vec::new()
    }

    fn open_sync(&mut self, targets: Vec<String>) -> Vec<Command> {
        let preview = targets
            .iter()
            .map(|name| {
                let source = match &self.detail {
                    Some(d) if &d.name == name => Some(d),
                    _ => self.projection.get(name),
                };
                let drifted = source.map(|a| a.drifted_resources().cloned().collect()).unwrap_or_default();
                SyncPreview { name: name.clone(), drifted }
            })
            .collect();
        let ticket = self.next_id();
        let (modal, cmd) = SyncModal::open(ticket, targets, preview);
        self.modal = Modal::Sync(modal);
        vec![cmd]
    }

    fn open_resource(&mut self) -> Vec<Command> {
        if self.focus == Focus::Apps {
            return self.toggle_focus();
        }
        let Some(reference) = self.selected_resource().map(Resource::reference) else {
            return self.hint("no resource selected");
        };
        let Some(app) = self.projection.selected_name() else {
            return self.hint("no application selected");
        };
        let ticket = self.next_id();
        let mut cmds = self.open_overlay(Overlay::Resource(ResourceView::new(ticket, app.clone(), reference.clone())));
        cmds.push(Command::LoadResource { ticket, app, reference });
        cmds
    }

    fn open_logs(&mut self) -> Vec<Command> {
        let pod = match self.selected_resource() {
            Some(r) if self.focus == Focus::Resources && r.is_pod() => Some(r.name.clone()),
            _ => None,
        };
        let Some(pod) = pod else {
            return self.hint("select a Pod to view logs");
        };
        let Some(app) = self.projection.selected_name() else {
            return self.hint("no application selected");
        };
        let stream_id = self.next_id();
        let view = LogView::new(stream_id, app, pod, self.options.log_backlog);
        let request = view.request();
        let mut cmds = self.open_overlay(Overlay::Logs(view));
        cmds.push(Command::StartLogStream { stream_id, request });
        cmds
    }

    fn toggle_follow(&mut self) -> Vec<Command> {
        let stream_id = self.next_id();
        let Some(Overlay::Logs(v)) = &mut self.overlay else {
            return Vec::new();
        };
        let mut cmds = Vec::new();
        if !v.ended {
            cmds.push(Command::CancelLogStream { stream_id: v.stream_id });
        }
        if v.follow {
            v.follow = false;
            v.ended = true;
            self.status = "follow off".into();
        } else {
            v.follow = true;
            v.restart(stream_id);
            cmds.push(Command::StartLogStream { stream_id, request: v.request() });
            self.status = "follow on".into();
        }
        cmds
    }

    fn open_diff(&mut self) -> Vec<Command> {
        let Some(app) = self.projection.selected_name() else {
            return self.hint("no application selected");
        };
        let filter = match self.focus {
            Focus::Resources => self.selected_resource().map(Resource::reference),
            Focus::Apps => None,
        };
        let ticket = self.next_id();
        let mut cmds = self.open_overlay(Overlay::Diff(DiffView::new(ticket, app.clone(), filter)));
        cmds.push(Command::LoadDiff { ticket, app });
        cmds
    }

    fn open_events(&mut self) -> Vec<Command> {
        let Some(app) = self.projection.selected_name() else {
            return self.hint("no application selected");
        };
        let ticket = self.next_id();
        let mut cmds = self.open_overlay(Overlay::Events(EventsView::new(ticket, app.clone())));
        cmds.push(Command::LoadEvents { ticket, app });
        cmds
    }

    fn open_history(&mut self) -> Vec<Command> {
        let Some(app) = self.current() else {
            return self.hint("no application selected");
        };
        let view = HistoryView::new(app.name.clone(), app.history.clone(), app.operation_state.clone());
        self.open_overlay(Overlay::History(view))
    }
}

/// Full-screen text for a failed first load.
fn error_page(error: &ApiError) -> String {
    let mut lines = vec![format!("Could not load applications: {error}"), String::new()];
    if let Some(hint) = error.hint() {
        lines.push(hint.to_string());
    }
    lines.push("check that the server address is reachable (--server or ARGOCD_SERVER)".into());
    lines.push("check the auth token (--token or ARGOCD_AUTH_TOKEN)".into());
    lines.push("for self-signed certificates use --insecure".into());
    lines.push(String::new());
    lines.push("press r to retry, q to quit".into());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use argonav_core::{OperationState, SYNCED};

    fn app(name: &str, sync: &str) -> Application {
        Application { name: name.into(), sync: sync.into(), health: "Healthy".into(), ..Default::default() }
    }

    fn pod(name: &str) -> Resource {
        Resource { kind: "Pod".into(), name: name.into(), namespace: "prod".into(), ..Default::default() }
    }

    fn loaded(apps: Vec<Application>) -> Session {
        let mut s = Session::default();
        let cmds = s.init();
        let Command::LoadApplications { generation } = cmds[0] else { panic!("expected list load") };
        s.update(Msg::AppsLoaded { generation, result: Ok(apps) });
        s
    }

    fn key(s: &mut Session, k: Key) -> Vec<Command> {
        s.update(Msg::Key(k))
    }

    fn detail_for(s: &mut Session, app: Application) {
        let generation = s.detail_issued;
        s.update(Msg::DetailLoaded { generation, name: app.name.clone(), result: Ok(app) });
    }

    #[test]
    fn first_load_selects_and_requests_detail() {
        let mut s = Session::default();
        let cmds = s.init();
        assert_eq!(cmds, vec![Command::LoadApplications { generation: 1 }]);
        let cmds = s.update(Msg::AppsLoaded { generation: 1, result: Ok(vec![app("a", SYNCED)]) });
        assert_eq!(cmds, vec![Command::LoadDetail { generation: 1, name: "a".into(), hard: false }]);
        assert!(s.loaded_once);
    }

    #[test]
    fn stale_list_is_dropped() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        let old = key(&mut s, Key::Char('r'));
        let new = key(&mut s, Key::Char('r'));
        let (Command::LoadApplications { generation: g1 }, Command::LoadApplications { generation: g2 }) =
            (&old[0], &new[0])
        else {
            panic!("expected list loads");
        };
        s.update(Msg::AppsLoaded { generation: *g2, result: Ok(vec![app("a", SYNCED), app("b", "OutOfSync")]) });
        s.update(Msg::AppsLoaded { generation: *g1, result: Ok(Vec::new()) });
        assert_eq!(s.projection.apps().len(), 2);
    }

    #[test]
    fn stale_detail_for_other_app_is_dropped() {
        let mut s = loaded(vec![app("a", SYNCED), app("b", SYNCED)]);
        let gen_a = s.detail_issued;
        key(&mut s, Key::Down);
        s.update(Msg::DetailLoaded { generation: gen_a, name: "a".into(), result: Ok(app("a", SYNCED)) });
        assert!(s.detail.is_none());
        detail_for(&mut s, app("b", SYNCED));
        assert_eq!(s.detail.as_ref().map(|d| d.name.as_str()), Some("b"));
    }

    #[test]
    fn first_failure_shows_error_page_later_failures_keep_data() {
        let mut s = Session::default();
        s.init();
        s.update(Msg::AppsLoaded { generation: 1, result: Err(ApiError::Auth("no token".into())) });
        assert!(s.error_page.as_deref().is_some_and(|p| p.contains("press r to retry")));
        key(&mut s, Key::Char('r'));
        s.update(Msg::AppsLoaded { generation: 2, result: Ok(vec![app("a", SYNCED)]) });
        assert!(s.error_page.is_none());
        key(&mut s, Key::Char('r'));
        s.update(Msg::AppsLoaded { generation: 3, result: Err(ApiError::Internal("down".into())) });
        assert!(s.error_page.is_none());
        assert_eq!(s.projection.apps().len(), 1);
        assert!(s.status.starts_with("refresh failed"));
    }

    #[test]
    fn sync_all_with_nothing_drifted_is_a_hint() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        assert!(key(&mut s, Key::Char('s')).is_empty());
        assert_eq!(s.status, "nothing to sync");
        assert!(!s.modal.is_open());
    }

    #[test]
    fn sync_all_targets_every_drifted_app_in_order() {
        let mut s = loaded(vec![app("a", SYNCED), app("b", "OutOfSync"), app("c", "Unknown")]);
        let cmds = key(&mut s, Key::Char('s'));
        let ticket = s.modal.ticket().unwrap_or_default();
        assert_eq!(cmds, vec![Command::SyncBatch { ticket, targets: vec!["b".into(), "c".into()], dry_run: true }]);
        assert!(key(&mut s, Key::Char('y')).is_empty());
    }

    #[test]
    fn terminate_requires_operation_in_flight() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        key(&mut s, Key::Char('x'));
        assert_eq!(s.status, "no operation in progress");
        let mut busy = app("a", SYNCED);
        busy.operation_state = Some(OperationState { phase: "Running".into(), message: String::new() });
        detail_for(&mut s, busy);
        key(&mut s, Key::Char('x'));
        assert!(matches!(s.modal, Modal::Terminate(_)));
    }

    #[test]
    fn filter_edits_live_and_esc_clears() {
        let mut s = loaded(vec![app("frontend", SYNCED), app("backend", SYNCED), app("api", SYNCED)]);
        key(&mut s, Key::Char('/'));
        for c in "END".chars() {
            key(&mut s, Key::Char(c));
        }
        assert_eq!(s.projection.view_len(), 2);
        key(&mut s, Key::Enter);
        assert!(s.filter.is_none());
        assert_eq!(s.projection.query(), "END");
        key(&mut s, Key::Esc);
        assert_eq!(s.projection.view_len(), 3);
    }

    #[test]
    fn empty_view_clears_detail_and_overlay() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        detail_for(&mut s, app("a", SYNCED));
        key(&mut s, Key::Char('h'));
        assert!(s.overlay.is_some());
        s.update(Msg::AppsLoaded { generation: s.list_issued, result: Ok(Vec::new()) });
        assert_eq!(s.projection.view_len(), 0);
        assert!(s.detail.is_none());
        assert!(s.overlay.is_none());
    }

    #[test]
    fn logs_only_for_pods_and_closing_cancels() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        let mut detail = app("a", SYNCED);
        detail.resources = vec![
            Resource { kind: "Service".into(), name: "svc".into(), ..Default::default() },
            pod("a-0"),
        ];
        detail_for(&mut s, detail);
        key(&mut s, Key::Char('l'));
        assert_eq!(s.status, "select a Pod to view logs");
        key(&mut s, Key::Tab);
        key(&mut s, Key::Down);
        let cmds = key(&mut s, Key::Char('l'));
        let Some(Command::StartLogStream { stream_id, request }) = cmds.last().cloned() else {
            panic!("expected log stream start, got {cmds:?}");
        };
        assert_eq!(request.pod, "a-0");
        assert!(request.follow);
        s.update(Msg::LogLine { stream_id: stream_id + 100, line: "foreign".into() });
        s.update(Msg::LogLine { stream_id, line: "hello".into() });
        let Some(Overlay::Logs(v)) = &s.overlay else { panic!("expected log overlay") };
        assert_eq!(v.lines.len(), 1);
        assert_eq!(key(&mut s, Key::Esc), vec![Command::CancelLogStream { stream_id }]);
    }

    #[test]
    fn follow_toggle_restarts_subscription() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        let mut detail = app("a", SYNCED);
        detail.resources = vec![pod("a-0")];
        detail_for(&mut s, detail);
        key(&mut s, Key::Tab);
        let cmds = key(&mut s, Key::Char('l'));
        let Some(Command::StartLogStream { stream_id: first, .. }) = cmds.last().cloned() else {
            panic!("expected log stream start");
        };
        assert_eq!(key(&mut s, Key::Char('f')), vec![Command::CancelLogStream { stream_id: first }]);
        let cmds = key(&mut s, Key::Char('f'));
        assert_eq!(cmds.len(), 1);
        let Command::StartLogStream { stream_id: second, .. } = &cmds[0] else { panic!("expected restart") };
        assert_ne!(*second, first);
        s.update(Msg::LogLine { stream_id: first, line: "late".into() });
        let Some(Overlay::Logs(v)) = &s.overlay else { panic!("expected log overlay") };
        assert!(v.lines.is_empty());
    }

    #[test]
    fn quitting_with_logs_open_cancels_them() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        let mut detail = app("a", SYNCED);
        detail.resources = vec![pod("a-0")];
        detail_for(&mut s, detail);
        key(&mut s, Key::Tab);
        key(&mut s, Key::Char('l'));
        let stream_id = s.overlay.as_ref().and_then(Overlay::stream_id).unwrap_or_default();
        // Overlay keys are captured, so quitting is the only other exit.
        let cmds = key(&mut s, Key::Ctrl('c'));
        assert_eq!(cmds, vec![Command::CancelLogStream { stream_id }]);
        assert!(s.should_quit());
    }

    #[test]
    fn resize_sets_visible_rows() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        s.update(Msg::Resize { width: 80, height: 30 });
        assert_eq!(s.projection.visible_rows(), 24);
        s.update(Msg::Resize { width: 80, height: 2 });
        assert_eq!(s.projection.visible_rows(), 1);
    }

    #[test]
    fn stale_modal_completion_is_ignored() {
        let mut s = loaded(vec![app("a", SYNCED)]);
        key(&mut s, Key::Char('b'));
        let ticket = s.modal.ticket().unwrap_or_default();
        key(&mut s, Key::Esc);
        key(&mut s, Key::Char('b'));
        s.update(Msg::RevisionsLoaded { ticket, result: Ok(vec![Default::default()]) });
        let Modal::Rollback(m) = &s.modal else { panic!("expected rollback modal") };
        assert!(m.loading);
        assert!(m.revisions.is_empty());
    }
}
