use protocol::{ServerEvent, SessionStatus};
use relay_core::mocks::{self, DriverCall};
use relay_core::ports::{ChatSummary, LastMessage, SessionIdentity};
use relay_core::session::SessionStateMachine;
use relay_core::{DriverEvent, LifecycleEvent};

fn identity() -> SessionIdentity {
    SessionIdentity {
        wid: "15550000@c.us".into(),
        pushname: "Relay".into(),
        platform: "android".into(),
    }
}

fn chat(user: &str, ts: i64) -> ChatSummary {
    ChatSummary {
        id: format!("{}@c.us", user),
        user: user.into(),
        name: Some(format!("Contact {}", user)),
        contact_pushname: None,
        is_group: false,
        unread_count: 1,
        last_message: Some(LastMessage { body: "hello".into(), timestamp: Some(ts) }),
    }
}

fn lifecycle_of(event: &DriverEvent) -> LifecycleEvent {
    match event {
        DriverEvent::Qr(_) => LifecycleEvent::LoginChallenge,
        DriverEvent::Authenticated => LifecycleEvent::Authenticated,
        DriverEvent::Ready(_) => LifecycleEvent::Ready,
        DriverEvent::AuthFailure(_) => LifecycleEvent::AuthFailure,
        DriverEvent::Disconnected(_) => LifecycleEvent::Disconnected,
        other => panic!("not a lifecycle event: {:?}", other),
    }
}

#[tokio::test]
async fn status_follows_transition_table_for_event_sequences() {
    let sequences: Vec<Vec<DriverEvent>> = vec![
        vec![DriverEvent::Qr("a".into()), DriverEvent::Authenticated, DriverEvent::Ready(identity())],
        vec![DriverEvent::Ready(identity()), DriverEvent::Authenticated, DriverEvent::Qr("late".into())],
        vec![
            DriverEvent::Qr("a".into()),
            DriverEvent::Qr("b".into()),
            DriverEvent::AuthFailure("bad".into()),
            DriverEvent::Qr("c".into()),
        ],
        vec![
            DriverEvent::Authenticated,
            DriverEvent::Ready(identity()),
            DriverEvent::Disconnected("LOGOUT".into()),
            DriverEvent::Qr("d".into()),
        ],
    ];

    for events in sequences {
        let (gateway, _driver, _webhook) = mocks::gateway();
        let mut expected = SessionStatus::Disconnected;
        for event in events {
            expected = SessionStateMachine::next_state(expected, lifecycle_of(&event)).unwrap_or(expected);
            gateway.handle_event(event).await;
            assert_eq!(gateway.current_status().await, expected);
        }
    }
}

#[tokio::test]
async fn status_exposes_challenge_only_until_authenticated() {
    let (gateway, _driver, _webhook) = mocks::gateway();

    gateway.handle_event(DriverEvent::Qr("2@xyz".into())).await;
    let status = gateway.status().await;
    assert_eq!(status.status, SessionStatus::QrReady);
    assert_eq!(status.qr, Some(mocks::rendered("2@xyz")));

    gateway.handle_event(DriverEvent::Authenticated).await;
    let status = gateway.status().await;
    assert_eq!(status.status, SessionStatus::Authenticated);
    assert!(status.qr.is_none());
}

#[tokio::test]
async fn connected_session_populates_info_and_contacts() {
    let (gateway, driver, _webhook) = mocks::gateway();
    driver.set_chats(vec![chat("1", 10), chat("2", 20)]);
    let mut rx = gateway.hub().subscribe();

    gateway.handle_event(DriverEvent::Authenticated).await;
    gateway.handle_event(DriverEvent::Ready(identity())).await;

    let info = gateway.status().await.info.expect("info while connected");
    assert_eq!(info.wid, "15550000@c.us");
    assert_eq!(info.pushname, "Relay");

    loop {
        if let ServerEvent::Contacts(contacts) = rx.recv().await.unwrap() {
            let phones: Vec<_> = contacts.iter().map(|c| c.phone_digits.as_str()).collect();
            assert_eq!(phones, vec!["2", "1"]);
            break;
        }
    }
}

#[tokio::test]
async fn reset_while_connected_clears_everything_immediately() {
    let (gateway, driver, _webhook) = mocks::gateway();
    driver.set_chats(vec![chat("1", 10)]);
    gateway.handle_event(DriverEvent::Authenticated).await;
    gateway.handle_event(DriverEvent::Ready(identity())).await;
    gateway.refresh_contacts().await;
    assert!(!gateway.snapshot_events().await.is_empty());

    gateway.reset().await.expect("reset succeeds");

    let status = gateway.status().await;
    assert_eq!(status.status, SessionStatus::Disconnected);
    assert!(status.info.is_none());
    assert!(status.qr.is_none());
    let snapshot = gateway.snapshot_events().await;
    assert_eq!(snapshot.len(), 1, "only the status frame remains: {:?}", snapshot);

    let calls = driver.calls();
    let logout = calls.iter().rposition(|c| *c == DriverCall::Logout).unwrap();
    let init = calls.iter().rposition(|c| *c == DriverCall::Initialize).unwrap();
    assert!(logout < init);
}

#[tokio::test]
async fn reset_reports_driver_failure_but_still_clears_state() {
    let (gateway, driver, _webhook) = mocks::gateway();
    gateway.handle_event(DriverEvent::Authenticated).await;
    gateway.handle_event(DriverEvent::Ready(identity())).await;
    driver.fail_logout_with("browser closed");

    let err = gateway.reset().await.unwrap_err();
    assert!(err.to_string().contains("browser closed"));
    assert_eq!(gateway.current_status().await, SessionStatus::Disconnected);
    assert!(gateway.status().await.info.is_none());
}

#[tokio::test]
async fn reset_recovers_from_init_failure() {
    let (gateway, driver, _webhook) = mocks::gateway();
    driver.fail_initialize_with("Failed to launch the browser process");
    gateway.start().await;
    assert_eq!(gateway.current_status().await, SessionStatus::AuthFailure);

    driver.clear_failures();
    gateway.reset().await.expect("reset succeeds");
    assert_eq!(gateway.current_status().await, SessionStatus::Disconnected);

    gateway.handle_event(DriverEvent::Qr("fresh".into())).await;
    assert_eq!(gateway.current_status().await, SessionStatus::QrReady);
}

#[tokio::test]
async fn stale_refresh_does_not_resurrect_contacts_after_disconnect() {
    let (gateway, driver, _webhook) = mocks::gateway();
    driver.set_chats(vec![chat("1", 10)]);
    gateway.handle_event(DriverEvent::Authenticated).await;
    gateway.handle_event(DriverEvent::Ready(identity())).await;

    gateway.handle_event(DriverEvent::Disconnected("CONFLICT".into())).await;
    gateway.refresh_contacts().await;

    assert_eq!(gateway.snapshot_events().await.len(), 1);
}

#[tokio::test]
async fn contacts_fetch_error_keeps_previous_snapshot() {
    let (gateway, driver, _webhook) = mocks::gateway();
    driver.set_chats(vec![chat("1", 10), chat("2", 5)]);
    gateway.handle_event(DriverEvent::Authenticated).await;
    gateway.handle_event(DriverEvent::Ready(identity())).await;
    gateway.refresh_contacts().await;

    driver.fail_chats_with("page crashed");
    gateway.refresh_contacts().await;

    let contacts = gateway.request_contacts().await.expect("cache kept");
    assert_eq!(contacts.len(), 2);
}
