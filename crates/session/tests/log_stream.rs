#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use argonav_api::{ArgoApi, MockApi};
use argonav_core::{Application, Resource};
use argonav_session::{Command, Dispatcher, Key, Msg, Overlay, Session};
use tokio::sync::mpsc;
use tokio::time::timeout;

fn app_with_pod() -> Application {
    Application {
        name: "web".into(),
        sync: "Synced".into(),
        resources: vec![Resource { kind: "Pod".into(), name: "web-0".into(), namespace: "web".into(), ..Default::default() }],
        ..Default::default()
    }
}

async fn wait_for(cond: impl Fn() -> bool) -> bool {
    timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

/// Pump the loop until `done` holds for the session or the channel goes quiet.
async fn run_until(
    session: &mut Session,
    dispatcher: &mut Dispatcher,
    rx: &mut mpsc::UnboundedReceiver<Msg>,
    done: impl Fn(&Session) -> bool,
) {
    while !done(session) {
        match timeout(Duration::from_secs(2), rx.recv()).await {
            Ok(Some(msg)) => {
                dispatcher.ack(&msg);
                let cmds = session.update(msg);
                dispatcher.dispatch(cmds);
            }
            _ => break,
        }
    }
}

fn log_lines(session: &Session) -> Vec<String> {
    match &session.overlay {
        Some(Overlay::Logs(v)) => v.lines.iter().cloned().collect(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn closing_log_overlay_releases_backend_stream() {
    let mock = Arc::new(
        MockApi::with_apps(vec![app_with_pod()]).with_log_lines(["one", "two", "three"]).hold_logs_open(true),
    );
    let api: Arc<dyn ArgoApi> = mock.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(api, tx).with_log_channel_cap(2);
    let mut session = Session::default();

    let cmds = session.init();
    dispatcher.dispatch(cmds);
    run_until(&mut session, &mut dispatcher, &mut rx, |s| !s.resources().is_empty()).await;

    for key in [Key::Tab, Key::Char('l')] {
        let cmds = session.update(Msg::Key(key));
        dispatcher.dispatch(cmds);
    }
    let stream_id = session.overlay.as_ref().and_then(Overlay::stream_id).unwrap_or_default();
    assert_eq!(dispatcher.active_log(), Some(stream_id));

    run_until(&mut session, &mut dispatcher, &mut rx, |s| log_lines(s).len() == 3).await;
    assert_eq!(log_lines(&session), vec!["one", "two", "three"]);
    assert_eq!(mock.logs_opened(), 1);
    assert_eq!(mock.logs_released(), 0);

    let cmds = session.update(Msg::Key(Key::Esc));
    assert_eq!(cmds, vec![Command::CancelLogStream { stream_id }]);
    dispatcher.dispatch(cmds);
    assert!(dispatcher.active_log().is_none());
    assert!(wait_for(|| mock.logs_released() == 1).await, "stream not released after cancel");
}

#[tokio::test]
async fn follow_toggle_reopens_and_releases_the_old_stream() {
    let mock = Arc::new(MockApi::with_apps(vec![app_with_pod()]).with_log_lines(["a"]).hold_logs_open(true));
    let api: Arc<dyn ArgoApi> = mock.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(api, tx);
    let mut session = Session::default();

    dispatcher.dispatch(session.init());
    run_until(&mut session, &mut dispatcher, &mut rx, |s| !s.resources().is_empty()).await;
    for key in [Key::Tab, Key::Char('l')] {
        let cmds = session.update(Msg::Key(key));
        dispatcher.dispatch(cmds);
    }
    run_until(&mut session, &mut dispatcher, &mut rx, |s| log_lines(s).len() == 1).await;

    // Off, then on again.
    for _ in 0..2 {
        let cmds = session.update(Msg::Key(Key::Char('f')));
        dispatcher.dispatch(cmds);
    }
    assert!(wait_for(|| mock.logs_opened() == 2).await);
    assert!(wait_for(|| mock.logs_released() == 1).await);
    run_until(&mut session, &mut dispatcher, &mut rx, |s| log_lines(s).len() == 1).await;
    assert_eq!(log_lines(&session), vec!["a"]);

    dispatcher.shutdown();
    assert!(wait_for(|| mock.logs_released() == 2).await, "shutdown must release the live stream");
}

#[tokio::test]
async fn finite_stream_ends_without_cancel() {
    let mock = Arc::new(MockApi::with_apps(vec![app_with_pod()]).with_log_lines(["x", "y"]));
    let api: Arc<dyn ArgoApi> = mock.clone();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut dispatcher = Dispatcher::new(api, tx);
    let mut session = Session::default();

    dispatcher.dispatch(session.init());
    run_until(&mut session, &mut dispatcher, &mut rx, |s| !s.resources().is_empty()).await;
    for key in [Key::Tab, Key::Char('l')] {
        let cmds = session.update(Msg::Key(key));
        dispatcher.dispatch(cmds);
    }
    let ended = |s: &Session| matches!(&s.overlay, Some(Overlay::Logs(v)) if v.ended);
    run_until(&mut session, &mut dispatcher, &mut rx, ended).await;
    assert_eq!(log_lines(&session), vec!["x", "y"]);
    assert!(wait_for(|| mock.logs_released() == 1).await);
}
