#![forbid(unsafe_code)]

use argonav_api::{ApiError, Call, MockApi};
use argonav_core::Application;
use argonav_session::{execute, Command, Key, Modal, Msg, Session};

fn app(name: &str, sync: &str) -> Application {
    Application { name: name.into(), sync: sync.into(), health: "Healthy".into(), ..Default::default() }
}

/// Run commands against the mock until the session stops asking for more.
async fn drive(session: &mut Session, api: &MockApi, cmds: Vec<Command>) {
    let mut queue = cmds;
    while !queue.is_empty() {
        let mut next = Vec::new();
        for cmd in queue {
            if let Some(msg) = execute(api, cmd).await {
                next.extend(session.update(msg));
            }
        }
        queue = next;
    }
}

async fn loaded(api: &MockApi) -> Session {
    let mut session = Session::default();
    let cmds = session.init();
    drive(&mut session, api, cmds).await;
    session
}

fn syncs(api: &MockApi) -> Vec<(String, bool)> {
    api.calls()
        .into_iter()
        .filter_map(|c| match c {
            Call::SyncApplication { name, dry_run } => Some((name, dry_run)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn dry_run_then_confirm_syncs_in_order_and_refreshes() {
    let api = MockApi::with_apps(vec![app("a", "Synced"), app("b", "OutOfSync"), app("c", "OutOfSync")]);
    api.fail_on(
        |c| matches!(c, Call::SyncApplication { name, dry_run: true } if name == "b"),
        ApiError::Internal("dry-run rejected".into()),
    );
    let mut session = loaded(&api).await;

    let cmds = session.update(Msg::Key(Key::Char('s')));
    drive(&mut session, &api, cmds).await;

    let Modal::Sync(modal) = &session.modal else { panic!("sync modal should be open") };
    assert!(modal.dry_run_complete);
    let summary: Vec<(&str, bool)> = modal.results.iter().map(|r| (r.name.as_str(), r.error.is_some())).collect();
    assert_eq!(summary, vec![("b", true), ("c", false)]);
    assert_eq!(syncs(&api), vec![("b".into(), true), ("c".into(), true)]);
    assert!(api.calls().iter().all(|c| !c.is_mutating()));

    let lists_before = api.calls().iter().filter(|c| **c == Call::ListApplications).count();
    let cmds = session.update(Msg::Key(Key::Char('y')));
    drive(&mut session, &api, cmds).await;

    assert_eq!(
        syncs(&api)[2..].to_vec(),
        vec![("b".to_string(), false), ("c".to_string(), false)]
    );
    let calls = api.calls();
    let last_sync = calls.iter().rposition(|c| matches!(c, Call::SyncApplication { .. })).unwrap_or_default();
    assert!(calls[last_sync..].contains(&Call::ListApplications));
    assert_eq!(calls.iter().filter(|c| **c == Call::ListApplications).count(), lists_before + 1);
    assert!(!session.modal.is_open());
    assert!(session.projection.apps().iter().all(|a| a.sync == "Synced"));
}

#[tokio::test]
async fn confirm_before_dry_run_completes_calls_nothing() {
    let api = MockApi::with_apps(vec![app("b", "OutOfSync")]);
    let mut session = loaded(&api).await;
    let pending = session.update(Msg::Key(Key::Char('y')));
    assert!(matches!(pending.as_slice(), [Command::SyncBatch { dry_run: true, .. }]));

    // Dry-run result has not arrived yet.
    assert!(session.update(Msg::Key(Key::Char('y'))).is_empty());
    assert!(syncs(&api).is_empty());

    drive(&mut session, &api, pending).await;
    let cmds = session.update(Msg::Key(Key::Char('y')));
    assert!(matches!(cmds.as_slice(), [Command::SyncBatch { dry_run: false, .. }]));
}

#[tokio::test]
async fn cancelling_sync_issues_no_mutation() {
    let api = MockApi::with_apps(vec![app("b", "OutOfSync")]);
    let mut session = loaded(&api).await;
    let cmds = session.update(Msg::Key(Key::Char('s')));
    drive(&mut session, &api, cmds).await;
    assert!(session.update(Msg::Key(Key::Esc)).is_empty());
    assert!(!session.modal.is_open());
    assert!(api.calls().iter().all(|c| !c.is_mutating()));
}

#[tokio::test]
async fn failed_real_sync_keeps_modal_open_with_error() {
    let api = MockApi::with_apps(vec![app("b", "OutOfSync")]);
    api.fail_on(
        |c| matches!(c, Call::SyncApplication { dry_run: false, .. }),
        ApiError::Status { method: "POST".into(), path: "/applications/b/sync".into(), status: 403, body: "denied".into() },
    );
    let mut session = loaded(&api).await;
    let cmds = session.update(Msg::Key(Key::Char('y')));
    drive(&mut session, &api, cmds).await;
    let cmds = session.update(Msg::Key(Key::Char('y')));
    drive(&mut session, &api, cmds).await;
    let Modal::Sync(modal) = &session.modal else { panic!("modal should stay open") };
    assert!(modal.error.is_some());
    assert!(!modal.syncing);
}
