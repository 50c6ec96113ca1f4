//! Frame rendering. Reads the session; never mutates it.

use argonav_core::{Application, SyncPolicy};
use argonav_session::modal::{DeleteModal, RollbackModal, Step, SyncModal, TerminateModal, Wizard};
use argonav_session::overlay::{DiffView, EventsView, HistoryView, LogView, ManifestFormat, ManifestTab, ResourceView};
use argonav_session::projection::window_offset;
use argonav_session::{Focus, Modal, Overlay, Session};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};
use ratatui::Frame;

/// Display settings that are not session state.
#[derive(Debug, Clone)]
pub struct ViewConfig {
    pub server: String,
    pub sidebar_width: u16,
}

const HELP: &[(&str, &str)] = &[
    ("j/k, arrows", "move selection"),
    ("PgUp/PgDn", "move by ten"),
    ("Tab", "switch apps / resources focus"),
    ("Enter, v", "open selected resource"),
    ("/", "filter applications"),
    ("D", "toggle drifted only"),
    ("S", "cycle sort (name, health, sync)"),
    ("r", "reload application list"),
    ("g / R", "refresh / hard refresh details"),
    ("s", "sync all drifted applications"),
    ("y", "sync selected application"),
    ("b", "roll back to a revision"),
    ("x", "terminate running operation"),
    ("c / e", "create / edit application"),
    ("Ctrl-d, Del", "delete application"),
    ("d", "diff (selected resource in resource focus)"),
    ("l", "pod logs (f follow, w wrap, / search, n next)"),
    ("h", "sync history"),
    ("E", "events"),
    ("Esc, q", "close overlay"),
    ("q, Ctrl-c", "quit"),
];

fn health_color(health: &str) -> Color {
    match health {
        "Healthy" => Color::Green,
        "Progressing" => Color::Yellow,
        "Degraded" => Color::Red,
        "Missing" => Color::Magenta,
        "Suspended" => Color::Blue,
        _ => Color::Gray,
    }
}

fn sync_color(sync: &str) -> Color {
    match sync {
        "Synced" => Color::Green,
        "OutOfSync" => Color::Yellow,
        _ => Color::Gray,
    }
}

fn dim() -> Style {
    Style::default().fg(Color::DarkGray)
}

fn highlight() -> Style {
    Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD)
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

pub fn draw(frame: &mut Frame<'_>, session: &Session, view: &ViewConfig) {
    let [header, body, footer] =
        Layout::vertical([Constraint::Length(1), Constraint::Min(1), Constraint::Length(3)]).areas(frame.area());

    draw_header(frame, header, session);
    draw_footer(frame, footer, session, view);

    if let Some(page) = &session.error_page {
        let p = Paragraph::new(page.as_str())
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: false })
            .block(Block::default().borders(Borders::ALL).title("Error"));
        frame.render_widget(p, body);
        return;
    }

    let [sidebar, main] =
        Layout::horizontal([Constraint::Length(view.sidebar_width), Constraint::Min(1)]).areas(body);
    draw_sidebar(frame, sidebar, session);
    match &session.overlay {
        Some(overlay) => draw_overlay(frame, main, overlay),
        None => draw_detail(frame, main, session),
    }
    if session.modal.is_open() {
        draw_modal(frame, body, &session.modal);
    }
}

fn draw_header(frame: &mut Frame<'_>, area: Rect, session: &Session) {
    let p = &session.projection;
    let mut spans = vec![
        Span::styled(" argonav ", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" apps {}/{} ", p.view_len(), p.apps().len())),
        Span::styled(format!(" sort: {} ", p.sort().label()), dim()),
    ];
    if p.drift_only() {
        spans.push(Span::styled(" drifted only ", Style::default().fg(Color::Yellow)));
    }
    match &session.filter {
        Some(input) => spans.push(Span::raw(format!(" filter: {}_", input.value()))),
        None if !p.query().is_empty() => spans.push(Span::raw(format!(" filter: {}", p.query()))),
        None => {}
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_footer(frame: &mut Frame<'_>, area: Rect, session: &Session, view: &ViewConfig) {
    let refreshed = session
        .last_refresh
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".into());
    let drifted = session.projection.apps().iter().filter(|a| a.is_drifted()).count();
    let line = Line::from(vec![
        Span::styled(format!("{} ", view.server), Style::default().fg(Color::Cyan)),
        Span::styled(format!("| refreshed {refreshed} "), dim()),
        Span::styled(format!("| {drifted} drifted "), Style::default().fg(Color::Yellow)),
        Span::raw(format!("| {}", session.status)),
        Span::styled("  ? help", dim()),
    ]);
    let p = Paragraph::new(line).block(Block::default().borders(Borders::TOP | Borders::BOTTOM));
    frame.render_widget(p, area);
}

fn draw_sidebar(frame: &mut Frame<'_>, area: Rect, session: &Session) {
    let selected = session.projection.selected_index();
    let lines: Vec<Line> = session
        .projection
        .visible()
        .map(|(i, app)| {
            let mut style = Style::default();
            if i == selected {
                style = if session.focus == Focus::Apps { highlight() } else { Style::default().add_modifier(Modifier::BOLD) };
            }
            Line::from(vec![
                Span::styled("● ", Style::default().fg(health_color(&app.health))),
                Span::styled(if app.is_drifted() { "~ " } else { "  " }, Style::default().fg(sync_color(&app.sync))),
                Span::styled(app.name.clone(), style),
            ])
        })
        .collect();
    let title = if session.loaded_once && lines.is_empty() { "Applications (none)" } else { "Applications" };
    let block = Block::default().borders(Borders::ALL).title(title);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn detail_lines(app: &Application) -> Vec<Line<'static>> {
    let field = |label: &str, value: &str| {
        Line::from(vec![Span::styled(format!("{label:<10}"), dim()), Span::raw(or_dash(value).to_string())])
    };
    let policy = app.sync_policy.map(|p| p.as_str()).unwrap_or("manual");
    let mut lines = vec![
        Line::from(vec![
            Span::styled(app.name.clone(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(or_dash(&app.health).to_string(), Style::default().fg(health_color(&app.health))),
            Span::raw(" / "),
            Span::styled(or_dash(&app.sync).to_string(), Style::default().fg(sync_color(&app.sync))),
        ]),
        field("project", &app.project),
        field("repo", &app.repo_url),
        field("path", &app.path),
        field("revision", &app.revision),
        field("cluster", &app.cluster),
        field("namespace", &app.namespace),
        field("policy", policy),
    ];
    if let Some(op) = &app.operation_state {
        lines.push(Line::from(Span::styled(
            format!("operation {}: {}", op.phase, op.message),
            Style::default().fg(Color::Yellow),
        )));
    }
    lines
}

fn draw_detail(frame: &mut Frame<'_>, area: Rect, session: &Session) {
    let Some(app) = session.current() else {
        let msg = if session.loaded_once { "no applications match" } else { "loading…" };
        frame.render_widget(Paragraph::new(msg).block(Block::default().borders(Borders::ALL)), area);
        return;
    };
    let summary = detail_lines(app);
    let [top, bottom] =
        Layout::vertical([Constraint::Length(summary.len() as u16 + 2), Constraint::Min(1)]).areas(area);
    frame.render_widget(Paragraph::new(summary).block(Block::default().borders(Borders::ALL).title("Details")), top);

    let resources = session.resources();
    let rows = bottom.height.saturating_sub(2) as usize;
    let offset = window_offset(session.resource_sel, session.resource_offset, resources.len(), rows);
    let lines: Vec<Line> = resources
        .iter()
        .enumerate()
        .skip(offset)
        .take(rows)
        .map(|(i, r)| {
            let style =
                if session.focus == Focus::Resources && i == session.resource_sel { highlight() } else { Style::default() };
            Line::from(vec![
                Span::styled(format!("{:<12}", or_dash(&r.status)), Style::default().fg(sync_color(&r.status))),
                Span::styled(format!("{:<12}", or_dash(&r.health)), Style::default().fg(health_color(&r.health))),
                Span::styled(format!("{}/{}", r.kind, r.name), style),
                Span::styled(if r.namespace.is_empty() { String::new() } else { format!("  {}", r.namespace) }, dim()),
            ])
        })
        .collect();
    let title = if session.detail.is_some() { format!("Resources ({})", resources.len()) } else { "Resources (loading)".into() };
    frame.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title)), bottom);
}

fn scrolled(lines: Vec<Line<'static>>, scroll: usize, title: String, wrap: bool) -> Paragraph<'static> {
    let p = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .scroll((scroll.min(u16::MAX as usize) as u16, 0));
    if wrap {
        p.wrap(Wrap { trim: false })
    } else {
        p
    }
}

fn status_lines(loading: bool, error: &Option<String>) -> Option<Vec<Line<'static>>> {
    if loading {
        return Some(vec![Line::from("loading…")]);
    }
    error.as_ref().map(|e| vec![Line::from(Span::styled(e.clone(), Style::default().fg(Color::Red)))])
}

fn draw_overlay(frame: &mut Frame<'_>, area: Rect, overlay: &Overlay) {
    let title = overlay.title();
    let widget = match overlay {
        Overlay::Resource(v) => resource_widget(v, title),
        Overlay::Events(v) => events_widget(v, title),
        Overlay::Logs(v) => log_widget(v, title, area.height.saturating_sub(2) as usize),
        Overlay::Diff(v) => diff_widget(v, title),
        Overlay::History(v) => history_widget(v, title),
        Overlay::Help => {
            let lines = HELP
                .iter()
                .map(|(k, d)| Line::from(vec![Span::styled(format!("{k:<14}"), Style::default().fg(Color::Cyan)), Span::raw(*d)]))
                .collect();
            scrolled(lines, 0, title, false)
        }
    };
    frame.render_widget(widget, area);
}

fn resource_widget(v: &ResourceView, title: String) -> Paragraph<'static> {
    if v.loading {
        return scrolled(vec![Line::from("loading…")], 0, title, false);
    }
    let tab = |label: &'static str, on: bool| {
        if on {
            Span::styled(format!("[{label}]"), Style::default().add_modifier(Modifier::BOLD))
        } else {
            Span::styled(format!(" {label} "), dim())
        }
    };
    let format = match v.format {
        ManifestFormat::Yaml => "yaml",
        ManifestFormat::Json => "json",
    };
    let mut lines = vec![Line::from(vec![
        tab("Live", v.tab == ManifestTab::Live),
        tab("Desired", v.tab == ManifestTab::Desired),
        Span::styled(format!("  {format} (Tab switch, t format)"), dim()),
    ])];
    lines.extend(v.body().lines().map(|l| Line::from(l.to_string())));
    scrolled(lines, v.scroll, title, false)
}

fn events_widget(v: &EventsView, title: String) -> Paragraph<'static> {
    if let Some(lines) = status_lines(v.loading, &v.error) {
        return scrolled(lines, 0, title, true);
    }
    if v.events.is_empty() {
        return scrolled(vec![Line::from("no events")], 0, title, false);
    }
    let lines = v
        .events
        .iter()
        .map(|e| {
            let color = if e.kind == "Warning" { Color::Yellow } else { Color::Gray };
            Line::from(vec![
                Span::styled(format!("{} ", e.timestamp), dim()),
                Span::styled(format!("{:<8}", e.kind), Style::default().fg(color)),
                Span::raw(format!("{} {}: {}", e.reason, e.involved_object, e.message)),
            ])
        })
        .collect();
    scrolled(lines, v.scroll, title, true)
}

fn diff_widget(v: &DiffView, title: String) -> Paragraph<'static> {
    if let Some(lines) = status_lines(v.loading, &v.error) {
        return scrolled(lines, 0, title, true);
    }
    let body = v.lines();
    if body.is_empty() {
        return scrolled(vec![Line::from("no differences")], 0, title, false);
    }
    let lines = body
        .into_iter()
        .map(|l| {
            let style = if l.starts_with("~ ") || l.starts_with("= ") {
                Style::default().add_modifier(Modifier::BOLD)
            } else if l.starts_with('+') {
                Style::default().fg(Color::Green)
            } else if l.starts_with('-') {
                Style::default().fg(Color::Red)
            } else {
                Style::default()
            };
            Line::from(Span::styled(l, style))
        })
        .collect();
    scrolled(lines, v.scroll, title, false)
}

fn history_widget(v: &HistoryView, title: String) -> Paragraph<'static> {
    let mut lines = Vec::new();
    if let Some(op) = &v.operation {
        lines.push(Line::from(Span::styled(
            format!("in progress: {} {}", op.phase, op.message),
            Style::default().fg(Color::Yellow),
        )));
    }
    if v.entries.is_empty() {
        lines.push(Line::from("no sync history"));
    }
    for (i, e) in v.entries.iter().enumerate() {
        let style = if i == v.cursor { highlight() } else { Style::default() };
        lines.push(Line::from(Span::styled(
            format!("#{:<4} {:<10} {}  {}", e.id, e.revision.chars().take(8).collect::<String>(), e.deployed_at, e.source),
            style,
        )));
    }
    scrolled(lines, 0, title, false)
}

fn log_widget(v: &LogView, title: String, rows: usize) -> Paragraph<'static> {
    let mut lines: Vec<Line> = Vec::new();
    let len = v.lines.len();
    let start = if v.follow { len.saturating_sub(rows.max(1)) } else { v.scroll.min(len.saturating_sub(1)) };
    for (i, line) in v.lines.iter().enumerate().skip(start).take(rows) {
        let style = if Some(i) == v.match_line {
            Style::default().bg(Color::Yellow).fg(Color::Black)
        } else if v.is_match(line) {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default()
        };
        lines.push(Line::from(Span::styled(line.clone(), style)));
    }
    if let Some(e) = &v.error {
        lines.push(Line::from(Span::styled(format!("stream error: {e}"), Style::default().fg(Color::Red))));
    } else if v.ended {
        lines.push(Line::from(Span::styled("-- stream ended --", dim())));
    }
    if let Some(input) = &v.search {
        lines.push(Line::from(Span::styled(format!("/{}_", input.value()), Style::default().fg(Color::Cyan))));
    }
    let flags = format!(
        "{} [follow {}] [wrap {}]{}",
        title,
        if v.follow { "on" } else { "off" },
        if v.wrap { "on" } else { "off" },
        if v.query.is_empty() { String::new() } else { format!(" [/{}]", v.query) },
    );
    scrolled(lines, 0, flags, v.wrap)
}

/// Centered popup of `pct` percent width and `height` rows, clipped to `area`.
fn popup_area(area: Rect, pct: u16, height: u16) -> Rect {
    let width = (area.width as u32 * pct as u32 / 100) as u16;
    let width = width.max(20).min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn draw_modal(frame: &mut Frame<'_>, area: Rect, modal: &Modal) {
    let mut lines = match modal {
        Modal::None => return,
        Modal::Delete(m) => delete_lines(m),
        Modal::Create(w) | Modal::Edit(w) => wizard_lines(w),
        Modal::Sync(m) => sync_lines(m),
        Modal::Rollback(m) => rollback_lines(m),
        Modal::Terminate(m) => terminate_lines(m),
    };
    let error = match modal {
        Modal::None => None,
        Modal::Delete(m) => m.error.as_ref(),
        Modal::Create(w) | Modal::Edit(w) => w.error.as_ref(),
        Modal::Sync(m) => m.error.as_ref(),
        Modal::Rollback(m) => m.error.as_ref(),
        Modal::Terminate(m) => m.error.as_ref(),
    };
    if let Some(e) = error {
        lines.push(Line::default());
        lines.push(Line::from(Span::styled(e.clone(), Style::default().fg(Color::Red))));
    }
    let popup = popup_area(area, 60, lines.len() as u16 + 2);
    frame.render_widget(Clear, popup);
    let p = Paragraph::new(lines)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title(modal.title()));
    frame.render_widget(p, popup);
}

fn delete_lines(m: &DeleteModal) -> Vec<Line<'static>> {
    let state = if m.confirmed() { Style::default().fg(Color::Red) } else { Style::default() };
    vec![
        Line::from(format!("Type {} to delete it.", m.target)),
        Line::from(Span::styled(format!("> {}_", m.input.value()), state)),
        Line::from(format!("cascade: {} (Tab toggles)", if m.cascade { "on" } else { "off" })),
        Line::from(Span::styled(
            if m.deleting { "deleting…" } else { "Enter delete, Esc cancel" },
            dim(),
        )),
    ]
}

fn wizard_lines(w: &Wizard) -> Vec<Line<'static>> {
    let steps = w.steps();
    let step = w.step();
    let mut lines = vec![Line::from(Span::styled(
        format!("step {}/{}: {}", w.index + 1, steps.len(), step.label()),
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    match step {
        Step::Confirm => {
            let s = &w.spec;
            for (label, value) in [
                ("name", s.name.as_str()),
                ("project", s.project.as_str()),
                ("repository", s.repo_url.as_str()),
                ("path", s.path.as_str()),
                ("revision", s.revision.as_str()),
                ("cluster", s.cluster.as_str()),
                ("namespace", s.namespace.as_str()),
                ("sync policy", s.sync_policy.as_str()),
            ] {
                lines.push(Line::from(vec![Span::styled(format!("{label:<12}"), dim()), Span::raw(or_dash(value).to_string())]));
            }
            let hint = if w.submitting { "submitting…" } else { "y submit, n cancel, Left back" };
            lines.push(Line::from(Span::styled(hint, dim())));
        }
        Step::SyncPolicy => {
            for policy in [SyncPolicy::Manual, SyncPolicy::Auto] {
                let on = w.spec.sync_policy == policy;
                let mark = if on { "(x) " } else { "( ) " };
                lines.push(Line::from(format!("{mark}{}", policy.as_str())));
            }
            lines.push(Line::from(Span::styled("a/m or arrows choose, Enter next", dim())));
        }
        _ if w.is_typing() => {
            lines.push(Line::from(format!("> {}_", w.input.value())));
            lines.push(Line::from(Span::styled("Enter next, Left back, Esc cancel", dim())));
        }
        _ => {
            if w.choices.loading {
                lines.push(Line::from("loading choices…"));
            }
            for (i, option) in w.options().iter().enumerate() {
                let style = if i == w.cursor { highlight() } else { Style::default() };
                lines.push(Line::from(Span::styled(option.clone(), style)));
            }
            lines.push(Line::from(Span::styled("arrows choose, Enter pick, Left back", dim())));
        }
    }
    lines
}

fn sync_lines(m: &SyncModal) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    for p in &m.preview {
        lines.push(Line::from(Span::styled(p.name.clone(), Style::default().add_modifier(Modifier::BOLD))));
        if p.drifted.is_empty() {
            lines.push(Line::from(Span::styled("  no drifted resources known", dim())));
        }
        for r in &p.drifted {
            lines.push(Line::from(format!("  {} {}/{}", or_dash(&r.status), r.kind, r.name)));
        }
    }
    lines.push(Line::default());
    for r in &m.results {
        let (mark, color, detail) = match &r.error {
            None => ("ok  ", Color::Green, String::new()),
            Some(e) => ("fail", Color::Red, format!(": {e}")),
        };
        lines.push(Line::from(vec![
            Span::styled(mark, Style::default().fg(color)),
            Span::raw(format!(" {}{detail}", r.name)),
        ]));
    }
    let hint = if m.syncing {
        "syncing…"
    } else if !m.dry_run_complete {
        "dry-run running…"
    } else {
        "y sync, n/Esc cancel"
    };
    lines.push(Line::from(Span::styled(hint, dim())));
    lines
}

fn rollback_lines(m: &RollbackModal) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(format!("Roll back {} to:", m.app))];
    if m.loading {
        lines.push(Line::from("loading revisions…"));
    }
    for (i, r) in m.revisions.iter().enumerate() {
        let style = if i == m.cursor { highlight() } else { Style::default() };
        lines.push(Line::from(Span::styled(
            format!("#{:<4} {:<10} {} {}", r.id, r.revision.chars().take(8).collect::<String>(), r.date, r.message),
            style,
        )));
    }
    let hint = match (m.running, m.armed) {
        (true, _) => "rolling back…",
        (false, true) => "y confirm, Esc cancel",
        (false, false) => "Enter select, Esc cancel",
    };
    lines.push(Line::from(Span::styled(hint, dim())));
    lines
}

fn terminate_lines(m: &TerminateModal) -> Vec<Line<'static>> {
    let hint = match (m.running, m.armed) {
        (true, _) => "terminating…",
        (false, true) => "y confirm, Esc cancel",
        (false, false) => "Enter arm, Esc cancel",
    };
    vec![
        Line::from(format!("Terminate the running operation on {}?", m.app)),
        Line::from(format!("{}: {}", m.operation.phase, m.operation.message)),
        Line::from(Span::styled(hint, dim())),
    ]
}
