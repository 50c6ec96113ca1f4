//! Terminal ownership and the event loop.
//!
//! One thread blocks on terminal input; everything else arrives on the same
//! channel from the dispatcher's tasks. The loop draws, waits for a message,
//! feeds it to the session, and hands the resulting commands to the dispatcher.

use std::io::{self, Stdout};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use argonav_api::ArgoApi;
use argonav_session::{Dispatcher, Key, Msg, Session, SessionOptions};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::render::{self, ViewConfig};

const INPUT_POLL: Duration = Duration::from_millis(250);

/// Messages applied per frame beyond the first.
const MAX_BATCH: usize = 256;

/// Raw mode plus alternate screen; restored on drop, including on error paths.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalGuard {
    fn enter() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e).context("enter alternate screen");
        }
        let terminal = Terminal::new(CrosstermBackend::new(stdout)).context("create terminal")?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        if let Err(e) = disable_raw_mode() {
            warn!(error = %e, "failed to disable raw mode");
        }
        if let Err(e) = execute!(self.terminal.backend_mut(), LeaveAlternateScreen) {
            warn!(error = %e, "failed to leave alternate screen");
        }
        let _ = self.terminal.show_cursor();
    }
}

/// Map a terminal key event onto the session's key vocabulary.
pub(crate) fn map_key(ev: KeyEvent) -> Option<Key> {
    if ev.kind == KeyEventKind::Release {
        return None;
    }
    let ctrl = ev.modifiers.contains(KeyModifiers::CONTROL);
    let key = match ev.code {
        KeyCode::Char(c) if ctrl => Key::Ctrl(c.to_ascii_lowercase()),
        KeyCode::Char(c) => Key::Char(c),
        KeyCode::Enter => Key::Enter,
        KeyCode::Esc => Key::Esc,
        KeyCode::Tab if ev.modifiers.contains(KeyModifiers::SHIFT) => Key::BackTab,
        KeyCode::Tab => Key::Tab,
        KeyCode::BackTab => Key::BackTab,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Up => Key::Up,
        KeyCode::Down => Key::Down,
        KeyCode::Left => Key::Left,
        KeyCode::Right => Key::Right,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        _ => return None,
    };
    Some(key)
}

fn map_event(ev: Event) -> Option<Msg> {
    match ev {
        Event::Key(k) => map_key(k).map(Msg::Key),
        Event::Resize(width, height) => Some(Msg::Resize { width, height }),
        _ => None,
    }
}

/// Blocking reader for terminal events. Exits once the loop drops its receiver.
fn spawn_input(tx: mpsc::UnboundedSender<Msg>) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(INPUT_POLL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(e) => {
                    warn!(error = %e, "terminal poll failed");
                    break;
                }
            }
            match event::read() {
                Ok(ev) => {
                    if let Some(msg) = map_event(ev) {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "terminal read failed");
                    break;
                }
            }
        }
        debug!("input thread exiting");
    })
}

pub async fn run(api: Arc<dyn ArgoApi>, cfg: &Config, server: String) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(api, tx.clone()).with_log_channel_cap(cfg.ui.log_channel_cap);
    let mut session = Session::new(SessionOptions { log_backlog: cfg.ui.log_backlog });
    let view = ViewConfig { server, sidebar_width: cfg.ui.sidebar_width };

    let mut guard = TerminalGuard::enter()?;
    let size = guard.terminal.size().context("query terminal size")?;
    session.update(Msg::Resize { width: size.width, height: size.height });
    let input = spawn_input(tx);
    dispatcher.dispatch(session.init());

    let result = event_loop(&mut guard, &mut session, &mut dispatcher, &mut rx, &view).await;

    dispatcher.shutdown();
    drop(rx);
    drop(guard);
    if input.join().is_err() {
        warn!("input thread panicked");
    }
    info!("argonav exiting");
    result
}

async fn event_loop(
    guard: &mut TerminalGuard,
    session: &mut Session,
    dispatcher: &mut Dispatcher,
    rx: &mut mpsc::UnboundedReceiver<Msg>,
    view: &ViewConfig,
) -> Result<()> {
    loop {
        guard.terminal.draw(|frame| render::draw(frame, session, view)).context("draw frame")?;
        let Some(msg) = rx.recv().await else {
            return Ok(());
        };
        handle(session, dispatcher, msg);
        // Batch queued messages (log bursts) into one redraw, but redraw regularly.
        for _ in 0..MAX_BATCH {
            if session.should_quit() {
                break;
            }
            let Ok(msg) = rx.try_recv() else {
                break;
            };
            handle(session, dispatcher, msg);
        }
        if session.should_quit() {
            return Ok(());
        }
    }
}

fn handle(session: &mut Session, dispatcher: &mut Dispatcher, msg: Msg) {
    dispatcher.ack(&msg);
    dispatcher.dispatch(session.update(msg));
}
