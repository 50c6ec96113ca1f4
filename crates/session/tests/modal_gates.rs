#![forbid(unsafe_code)]

use argonav_api::{ApiError, Call, MockApi};
use argonav_session::{execute, Command, Key, Modal, Msg, Session};

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

async fn press(session: &mut Session, api: &MockApi, keys: &[Key]) {
    for key in keys {
        let cmds = session.update(Msg::Key(*key));
        drive(session, api, cmds).await;
    }
}

async fn type_text(session: &mut Session, api: &MockApi, text: &str) {
    let keys: Vec<Key> = text.chars().map(Key::Char).collect();
    press(session, api, &keys).await;
}

async fn demo_session(api: &MockApi) -> Session {
    let mut session = Session::default();
    let cmds = session.init();
    drive(&mut session, api, cmds).await;
    session
}

fn mutations(api: &MockApi) -> Vec<Call> {
    api.calls().into_iter().filter(Call::is_mutating).collect()
}

/// Move the cursor onto `name`. Detail loads issued on the way are dropped.
fn select(session: &mut Session, name: &str) {
    while session.projection.selected_index() > 0 {
        session.update(Msg::Key(Key::PageUp));
    }
    for _ in 0..session.projection.view_len() {
        if session.selected().is_some_and(|a| a.name == name) {
            return;
        }
        session.update(Msg::Key(Key::Down));
    }
    panic!("{name} not in view");
}

#[tokio::test]
async fn delete_needs_exact_name() {
    let api = MockApi::demo();
    let mut session = demo_session(&api).await;
    assert_eq!(session.selected().map(|a| a.name.as_str()), Some("cluster-addons"));

    press(&mut session, &api, &[Key::Ctrl('d')]).await;
    type_text(&mut session, &api, "cluster-addon").await;
    press(&mut session, &api, &[Key::Enter]).await;
    assert!(mutations(&api).is_empty());
    assert!(matches!(session.modal, Modal::Delete(_)));

    type_text(&mut session, &api, "s").await;
    press(&mut session, &api, &[Key::Tab, Key::Enter]).await;
    assert_eq!(mutations(&api), vec![Call::DeleteApplication { name: "cluster-addons".into(), cascade: true }]);
    assert!(!session.modal.is_open());
    assert!(session.projection.get("cluster-addons").is_none());
    assert_eq!(session.status, "loaded 4 applications");
}

#[tokio::test]
async fn rollback_is_arm_then_confirm() {
    let api = MockApi::demo();
    let mut session = demo_session(&api).await;
    select(&mut session, "web-frontend");

    press(&mut session, &api, &[Key::Char('b'), Key::Char('y')]).await;
    assert!(mutations(&api).is_empty());
    press(&mut session, &api, &[Key::Down, Key::Enter, Key::Down]).await;
    press(&mut session, &api, &[Key::Char('y')]).await;
    assert!(mutations(&api).is_empty(), "moving the cursor must disarm");

    press(&mut session, &api, &[Key::Enter, Key::Char('y')]).await;
    assert_eq!(mutations(&api), vec![Call::RollbackApplication { name: "web-frontend".into(), revision_id: 1 }]);
    assert!(!session.modal.is_open());
}

#[tokio::test]
async fn terminate_only_with_operation() {
    let api = MockApi::demo();
    let mut session = demo_session(&api).await;
    select(&mut session, "payments-api");
    press(&mut session, &api, &[Key::Char('x')]).await;
    assert!(!session.modal.is_open());
    assert_eq!(session.status, "no operation in progress");

    select(&mut session, "orders-worker");
    press(&mut session, &api, &[Key::Char('x'), Key::Enter, Key::Char('y')]).await;
    assert_eq!(mutations(&api), vec![Call::TerminateOperation("orders-worker".into())]);
    assert!(session.current().is_some_and(|a| a.operation_state.is_none()));
}

#[tokio::test]
async fn create_wizard_submits_once_and_reloads() {
    let api = MockApi::demo();
    let mut session = demo_session(&api).await;
    press(&mut session, &api, &[Key::Char('c')]).await;
    type_text(&mut session, &api, "billing").await;
    // name, project, repo
    press(&mut session, &api, &[Key::Enter, Key::Enter, Key::Down, Key::Enter]).await;
    type_text(&mut session, &api, "apps/billing").await;
    // path, revision (main), cluster
    press(&mut session, &api, &[Key::Enter, Key::Enter, Key::Enter]).await;
    type_text(&mut session, &api, "billing").await;
    press(&mut session, &api, &[Key::Enter, Key::Enter, Key::Char('y')]).await;

    let creates: Vec<Call> = mutations(&api);
    assert_eq!(creates.len(), 1);
    let Call::CreateApplication(spec) = &creates[0] else { panic!("expected create") };
    assert_eq!(spec.repo_url, "https://github.com/example/platform");
    assert_eq!(spec.revision, "main");
    assert!(session.projection.get("billing").is_some());
}

#[tokio::test]
async fn modal_failure_stays_open_for_retry() {
    let api = MockApi::demo();
    api.fail_on(|c| matches!(c, Call::DeleteApplication { .. }), ApiError::Internal("forbidden".into()));
    let mut session = demo_session(&api).await;
    press(&mut session, &api, &[Key::Ctrl('d')]).await;
    type_text(&mut session, &api, "cluster-addons").await;
    press(&mut session, &api, &[Key::Enter]).await;
    let Modal::Delete(modal) = &session.modal else { panic!("delete modal should remain") };
    assert_eq!(modal.error.as_deref(), Some("internal: forbidden"));

    api.clear_failures();
    press(&mut session, &api, &[Key::Enter]).await;
    assert!(!session.modal.is_open());
}
