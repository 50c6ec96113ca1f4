//! Detail overlays. At most one is visible; a log overlay owns the active subscription.

use std::collections::VecDeque;

use argonav_api::ApiError;
use argonav_core::{DiffResult, Event, OperationState, ResourceRef, SyncHistoryEntry};
use regex::Regex;

use crate::input::TextInput;
use crate::keys::Key;

/// Move a scroll position, clamped to `[0, len - 1]`.
fn scroll_by(pos: &mut usize, delta: isize, len: usize) {
    *pos = pos.saturating_add_signed(delta).min(len.saturating_sub(1));
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestTab {
    #[default]
    Live,
    Desired,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestFormat {
    #[default]
    Yaml,
    Json,
}

/// Re-render a manifest. Text that does not parse is shown as-is.
pub fn format_manifest(text: &str, format: ManifestFormat) -> String {
    let Ok(value) = serde_yaml::from_str::<serde_json::Value>(text) else {
        return text.to_string();
    };
    let rendered = match format {
        ManifestFormat::Yaml => serde_yaml::to_string(&value).map_err(|e| e.to_string()),
        ManifestFormat::Json => serde_json::to_string_pretty(&value).map_err(|e| e.to_string()),
    };
    rendered.unwrap_or_else(|_| text.to_string())
}

/// First desired manifest with the same kind, name and namespace. An empty
/// namespace on the reference matches any namespace.
pub fn match_desired<'a>(manifests: &'a [String], reference: &ResourceRef) -> Option<&'a String> {
    manifests.iter().find(|raw| {
        let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(raw) else {
            return false;
        };
        let field = |v: Option<&serde_yaml::Value>| v.and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let meta = doc.get("metadata");
        if field(doc.get("kind")) != reference.kind {
            return false;
        }
        if field(meta.and_then(|m| m.get("name"))) != reference.name {
            return false;
        }
        reference.namespace.is_empty() || field(meta.and_then(|m| m.get("namespace"))) == reference.namespace
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceView {
    pub ticket: u64,
    pub app: String,
    pub reference: ResourceRef,
    pub loading: bool,
    pub error: Option<String>,
    pub live: String,
    pub desired: Option<String>,
    pub desired_error: Option<String>,
    pub tab: ManifestTab,
    pub format: ManifestFormat,
    pub scroll: usize,
}

impl ResourceView {
    pub(crate) fn new(ticket: u64, app: String, reference: ResourceRef) -> Self {
        Self {
            ticket,
            app,
            reference,
            loading: true,
            error: None,
            live: String::new(),
            desired: None,
            desired_error: None,
            tab: ManifestTab::Live,
            format: ManifestFormat::Yaml,
            scroll: 0,
        }
    }

    pub(crate) fn on_loaded(&mut self, live: Result<String, ApiError>, desired: Result<Vec<String>, ApiError>) {
        self.loading = false;
        match live {
            Ok(text) => self.live = text,
            Err(e) => self.error = Some(e.to_string()),
        }
        match desired {
            Ok(manifests) => match match_desired(&manifests, &self.reference) {
                Some(found) => self.desired = Some(found.clone()),
                None => self.desired_error = Some("no matching desired manifest".into()),
            },
            Err(e) => self.desired_error = Some(e.to_string()),
        }
    }

    /// Text of the active tab in the active format.
    pub fn body(&self) -> String {
        match self.tab {
            ManifestTab::Live => match &self.error {
                Some(e) => e.clone(),
                None => format_manifest(&self.live, self.format),
            },
            ManifestTab::Desired => match (&self.desired, &self.desired_error) {
                (Some(text), _) => format_manifest(text, self.format),
                (None, Some(e)) => e.clone(),
                (None, None) => String::new(),
            },
        }
    }

    fn handle_key(&mut self, key: Key) {
        match key {
            Key::Tab => {
                self.tab = match self.tab {
                    ManifestTab::Live => ManifestTab::Desired,
                    ManifestTab::Desired => ManifestTab::Live,
                };
                self.scroll = 0;
            }
            Key::Char('t') => {
                self.format = match self.format {
                    ManifestFormat::Yaml => ManifestFormat::Json,
                    ManifestFormat::Json => ManifestFormat::Yaml,
                };
                self.scroll = 0;
            }
            other => {
                if let Some(delta) = other.vertical() {
                    let len = self.body().lines().count();
                    scroll_by(&mut self.scroll, delta, len);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventsView {
    pub ticket: u64,
    pub app: String,
    pub loading: bool,
    pub error: Option<String>,
    pub events: Vec<Event>,
    pub scroll: usize,
}

impl EventsView {
    pub(crate) fn new(ticket: u64, app: String) -> Self {
        Self { ticket, app, loading: true, error: None, events: Vec::new(), scroll: 0 }
    }

    pub(crate) fn on_loaded(&mut self, result: Result<Vec<Event>, ApiError>) {
        self.loading = false;
        match result {
            Ok(events) => self.events = events,
            Err(e) => self.error = Some(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffView {
    pub ticket: u64,
    pub app: String,
    /// Set when opened from resource focus.
    pub filter: Option<ResourceRef>,
    pub loading: bool,
    pub error: Option<String>,
    pub results: Vec<DiffResult>,
    pub show_whitespace: bool,
    pub scroll: usize,
}

impl DiffView {
    pub(crate) fn new(ticket: u64, app: String, filter: Option<ResourceRef>) -> Self {
        Self { ticket, app, filter, loading: true, error: None, results: Vec::new(), show_whitespace: false, scroll: 0 }
    }

    pub(crate) fn on_loaded(&mut self, result: Result<Vec<DiffResult>, ApiError>) {
        self.loading = false;
        match result {
            Ok(results) => self.results = results,
            Err(e) => self.error = Some(e.to_string()),
        }
    }

    pub fn visible(&self) -> impl Iterator<Item = &DiffResult> + '_ {
        self.results.iter().filter(move |r| match &self.filter {
            None => true,
            Some(f) => {
                r.reference.kind == f.kind
                    && r.reference.name == f.name
                    && (f.namespace.is_empty() || r.reference.namespace == f.namespace)
            }
        })
    }

    /// Rendered diff text, one entry per line, with whitespace markers when enabled.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::new();
        for result in self.visible() {
            let marker = if result.modified { "~" } else { "=" };
            out.push(format!("{} {}", marker, result.reference));
            for line in result.diff.lines() {
                if self.show_whitespace {
                    out.push(line.replace(' ', "·").replace('\t', "→"));
                } else {
                    out.push(line.to_string());
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryView {
    pub app: String,
    /// Newest first.
    pub entries: Vec<SyncHistoryEntry>,
    pub operation: Option<OperationState>,
    pub cursor: usize,
}

impl HistoryView {
    pub(crate) fn new(app: String, mut entries: Vec<SyncHistoryEntry>, operation: Option<OperationState>) -> Self {
        entries.sort_by(|a, b| b.id.cmp(&a.id));
        Self { app, entries, operation, cursor: 0 }
    }

    pub fn selected(&self) -> Option<&SyncHistoryEntry> {
        self.entries.get(self.cursor)
    }
}

#[derive(Debug, Clone)]
pub struct LogView {
    pub stream_id: u64,
    pub app: String,
    pub pod: String,
    pub container: Option<String>,
    pub follow: bool,
    pub wrap: bool,
    pub lines: VecDeque<String>,
    pub backlog: usize,
    /// Some while the search prompt is open.
    pub search: Option<TextInput>,
    pub query: String,
    matcher: Option<Regex>,
    pub match_line: Option<usize>,
    pub ended: bool,
    pub error: Option<String>,
    pub scroll: usize,
}

impl LogView {
    pub(crate) fn new(stream_id: u64, app: String, pod: String, backlog: usize) -> Self {
        Self {
            stream_id,
            app,
            pod,
            container: None,
            follow: true,
            wrap: false,
            lines: VecDeque::new(),
            backlog: backlog.max(1),
            search: None,
            query: String::new(),
            matcher: None,
            match_line: None,
            ended: false,
            error: None,
            scroll: 0,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        self.lines.push_back(line);
        if self.lines.len() > self.backlog {
            self.lines.pop_front();
            self.scroll = self.scroll.saturating_sub(1);
            self.match_line = self.match_line.and_then(|i| i.checked_sub(1));
        }
        if self.follow {
            self.scroll = self.lines.len().saturating_sub(1);
        }
    }

    pub(crate) fn on_failed(&mut self, error: String) {
        self.error = Some(error);
        self.ended = true;
    }

    /// Switch to a fresh subscription; the buffer starts over.
    pub(crate) fn restart(&mut self, stream_id: u64) {
        self.stream_id = stream_id;
        self.lines.clear();
        self.scroll = 0;
        self.match_line = None;
        self.ended = false;
        self.error = None;
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.matcher.as_ref().is_some_and(|re| re.is_match(line))
    }

    fn commit_search(&mut self, query: String) {
        self.matcher = if query.is_empty() {
            None
        } else {
            Regex::new(&query).or_else(|_| Regex::new(&regex::escape(&query))).ok()
        };
        self.query = query;
        self.match_line = None;
        self.next_match();
    }

    /// Jump to the next matching line after the current one, wrapping around.
    pub(crate) fn next_match(&mut self) -> bool {
        let Some(re) = &self.matcher else {
            return false;
        };
        let len = self.lines.len();
        let start = self.match_line.map(|i| i + 1).unwrap_or(0);
        let found = (0..len).map(|k| (start + k) % len.max(1)).find(|&i| re.is_match(&self.lines[i]));
        if let Some(i) = found {
            self.match_line = Some(i);
            self.scroll = i;
            self.follow = false;
        }
        found.is_some()
    }

    pub fn request(&self) -> argonav_ops::LogRequest {
        argonav_ops::LogRequest {
            app: self.app.clone(),
            pod: self.pod.clone(),
            container: self.container.clone(),
            follow: self.follow,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Overlay {
    Resource(ResourceView),
    Events(EventsView),
    Logs(LogView),
    Diff(DiffView),
    History(HistoryView),
    Help,
}

/// What the session must do after an overlay key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OverlayAction {
    Stay,
    Close,
    Hint(String),
    /// Follow was toggled on the log overlay; the subscription must be replaced.
    ToggleFollow,
}

impl Overlay {
    pub fn title(&self) -> String {
        match self {
            Overlay::Resource(v) => format!("Resource {}", v.reference),
            Overlay::Events(v) => format!("Events {}", v.app),
            Overlay::Logs(v) => format!("Logs {}/{}", v.app, v.pod),
            Overlay::Diff(v) => format!("Diff {}", v.app),
            Overlay::History(v) => format!("History {}", v.app),
            Overlay::Help => "Help".to_string(),
        }
    }

    /// Ticket of an overlay waiting on a fetch.
    pub fn ticket(&self) -> Option<u64> {
        match self {
            Overlay::Resource(v) => Some(v.ticket),
            Overlay::Events(v) => Some(v.ticket),
            Overlay::Diff(v) => Some(v.ticket),
            _ => None,
        }
    }

    pub fn stream_id(&self) -> Option<u64> {
        match self {
            Overlay::Logs(v) => Some(v.stream_id),
            _ => None,
        }
    }

    pub(crate) fn handle_key(&mut self, key: Key) -> OverlayAction {
        if let Overlay::Logs(log) = self {
            if let Some(input) = log.search.as_mut() {
                match key {
                    Key::Esc => log.search = None,
                    Key::Enter => {
                        let query = input.value().to_string();
                        log.search = None;
                        log.commit_search(query);
                        if log.matcher.is_some() && log.match_line.is_none() {
                            return OverlayAction::Hint(format!("no match for {}", log.query));
                        }
                    }
                    other => {
                        input.edit(other);
                    }
                }
                return OverlayAction::Stay;
            }
        }
        if matches!(key, Key::Esc | Key::Char('q')) {
            return OverlayAction::Close;
        }
        match self {
            Overlay::Resource(v) => v.handle_key(key),
            Overlay::Events(v) => {
                if let Some(delta) = key.vertical() {
                    scroll_by(&mut v.scroll, delta, v.events.len());
                }
            }
            Overlay::Diff(v) => match key {
                Key::Char('W') => v.show_whitespace = !v.show_whitespace,
                other => {
                    if let Some(delta) = other.vertical() {
                        let len = v.lines().len();
                        scroll_by(&mut v.scroll, delta, len);
                    }
                }
            },
            Overlay::History(v) => {
                if let Some(delta) = key.vertical() {
                    scroll_by(&mut v.cursor, delta, v.entries.len());
                }
            }
            Overlay::Logs(v) => match key {
                Key::Char('f') => return OverlayAction::ToggleFollow,
                Key::Char('w') => v.wrap = !v.wrap,
                Key::Char('/') => v.search = Some(TextInput::with_value(v.query.clone())),
                Key::Char('n') => {
                    if v.matcher.is_none() {
                        return OverlayAction::Hint("press / to search".into());
                    }
                    if !v.next_match() {
                        return OverlayAction::Hint(format!("no match for {}", v.query));
                    }
                }
                other => {
                    if let Some(delta) = other.vertical() {
                        v.follow = v.follow && delta > 0;
                        scroll_by(&mut v.scroll, delta, v.lines.len());
                    }
                }
            },
            Overlay::Help => {}
        }
        OverlayAction::Stay
    }
}
