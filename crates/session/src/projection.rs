//! Application projection: canonical snapshot in, filtered + sorted view out.
//!
//! Every mutator recomputes the view from scratch; nothing is patched
//! incrementally. Selection follows the application name across recomputes.

use argonav_core::{Application, SYNCED};

/// Rows shown before the first resize arrives.
pub const DEFAULT_VISIBLE_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SortMode {
    #[default]
    Name,
    Health,
    Sync,
}

impl SortMode {
    pub fn next(self) -> Self {
        match self {
            SortMode::Name => SortMode::Health,
            SortMode::Health => SortMode::Sync,
            SortMode::Sync => SortMode::Name,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SortMode::Name => "name",
            SortMode::Health => "health",
            SortMode::Sync => "sync",
        }
    }

    fn rank(self, app: &Application) -> u8 {
        match self {
            SortMode::Name => 0,
            SortMode::Health => health_rank(&app.health),
            SortMode::Sync => sync_rank(&app.sync),
        }
    }
}

/// Worst first: degraded < missing < suspended < progressing < healthy < other < empty.
pub fn health_rank(health: &str) -> u8 {
    match health.trim().to_ascii_lowercase().as_str() {
        "degraded" => 0,
        "missing" => 1,
        "suspended" => 2,
        "progressing" => 3,
        "healthy" => 4,
        "" => 98,
        _ => 50,
    }
}

/// Drift first: out-of-sync < unknown < synced < other < empty.
pub fn sync_rank(sync: &str) -> u8 {
    match sync.trim().to_ascii_lowercase().as_str() {
        "outofsync" | "out-of-sync" | "out_of_sync" => 0,
        "unknown" => 1,
        "synced" => 2,
        "" => 98,
        _ => 50,
    }
}

/// Scroll offset keeping `selected` inside a window of `rows`, clamped to `[0, len - rows]`.
pub fn window_offset(selected: usize, offset: usize, len: usize, rows: usize) -> usize {
    if rows == 0 || len == 0 {
        return 0;
    }
    let max = len.saturating_sub(rows);
    let mut off = offset.min(max);
    if selected < off {
        off = selected;
    } else if selected >= off + rows {
        off = selected + 1 - rows;
    }
    off.min(max)
}

#[derive(Debug, Clone)]
pub struct Projection {
    apps: Vec<Application>,
    /// Indices into `apps`, in display order.
    view: Vec<usize>,
    selected: usize,
    offset: usize,
    visible_rows: usize,
    query: String,
    drift_only: bool,
    sort: SortMode,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            apps: Vec::new(),
            view: Vec::new(),
            selected: 0,
            offset: 0,
            visible_rows: DEFAULT_VISIBLE_ROWS,
            query: String::new(),
            drift_only: false,
            sort: SortMode::Name,
        }
    }
}

impl Projection {
    /// Replace the canonical set. Returns true if the selected application changed.
    pub fn ingest(&mut self, apps: Vec<Application>) -> bool {
        let prev = self.selected_name();
        self.apps = apps;
        self.recompute(prev)
    }

    pub fn set_query(&mut self, query: impl Into<String>) -> bool {
        let prev = self.selected_name();
        self.query = query.into();
        self.recompute(prev)
    }

    pub fn set_drift_only(&mut self, on: bool) -> bool {
        let prev = self.selected_name();
        self.drift_only = on;
        self.recompute(prev)
    }

    pub fn cycle_sort(&mut self) -> bool {
        let prev = self.selected_name();
        self.sort = self.sort.next();
        self.recompute(prev)
    }

    /// Move the cursor, clamped to the view. Returns true if the selection moved.
    pub fn move_by(&mut self, delta: isize) -> bool {
        if self.view.is_empty() {
            return false;
        }
        let last = self.view.len() - 1;
        let next = self.selected.saturating_add_signed(delta).min(last);
        let moved = next != self.selected;
        self.selected = next;
        self.offset = window_offset(self.selected, self.offset, self.view.len(), self.visible_rows);
        moved
    }

    pub fn set_visible_rows(&mut self, rows: usize) {
        self.visible_rows = rows.max(1);
        self.offset = window_offset(self.selected, self.offset, self.view.len(), self.visible_rows);
    }

    fn recompute(&mut self, prev: Option<String>) -> bool {
        let needle = self.query.trim().to_lowercase();
        let mut view: Vec<usize> = self
            .apps
            .iter()
            .enumerate()
            .filter(|(_, a)| needle.is_empty() || a.name.to_lowercase().contains(&needle))
            .filter(|(_, a)| !self.drift_only || a.sync != SYNCED)
            .map(|(i, _)| i)
            .collect();
        let sort = self.sort;
        let apps = &self.apps;
        // sort_by_cached_key is stable; ties keep canonical order.
        view.sort_by_cached_key(|&i| (sort.rank(&apps[i]), apps[i].name.to_lowercase()));
        self.view = view;

        if self.view.is_empty() {
            self.selected = 0;
        } else if let Some(pos) = prev.as_deref().and_then(|name| self.position(name)) {
            self.selected = pos;
        } else {
            self.selected = self.selected.min(self.view.len() - 1);
        }
        self.offset = window_offset(self.selected, self.offset, self.view.len(), self.visible_rows);
        self.selected_name() != prev
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.view.iter().position(|&i| self.apps[i].name == name)
    }

    pub fn selected(&self) -> Option<&Application> {
        self.view.get(self.selected).map(|&i| &self.apps[i])
    }

    pub fn selected_name(&self) -> Option<String> {
        self.selected().map(|a| a.name.clone())
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn visible_rows(&self) -> usize {
        self.visible_rows
    }

    pub fn view_len(&self) -> usize {
        self.view.len()
    }

    pub fn view(&self) -> impl Iterator<Item = &Application> + '_ {
        self.view.iter().map(move |&i| &self.apps[i])
    }

    /// The windowed slice of the view, with view indices.
    pub fn visible(&self) -> impl Iterator<Item = (usize, &Application)> + '_ {
        self.view().enumerate().skip(self.offset).take(self.visible_rows)
    }

    /// Canonical set, in server order.
    pub fn apps(&self) -> &[Application] {
        &self.apps
    }

    pub fn get(&self, name: &str) -> Option<&Application> {
        self.apps.iter().find(|a| a.name == name)
    }

    /// Every canonical application not in Synced state, in server order.
    pub fn drifted_names(&self) -> Vec<String> {
        self.apps.iter().filter(|a| a.is_drifted()).map(|a| a.name.clone()).collect()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn drift_only(&self) -> bool {
        self.drift_only
    }

    pub fn sort(&self) -> SortMode {
        self.sort
    }
}
