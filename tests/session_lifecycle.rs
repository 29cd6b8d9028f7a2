//! Integration tests for the session lifecycle over in-memory and
//! filesystem handlers.

use serde_json::json;
use std::sync::{Arc, Mutex};
use tessera_session::prelude::*;

fn memory_session(options: SessionOptions) -> Session<NativeStorage<MemoryHandler>> {
    Session::new(NativeStorage::new(MemoryHandler::new()), options)
}

/// Seed the prefixed default namespace with fabricated timer values,
/// as a previous request would have left them.
async fn seed_timers(handler: &MemoryHandler, id: &str, timestamp: i64) {
    let mut store = NativeStorage::new(handler.clone()).with_id(id);

    store
        .set("session.timer.start", json!(timestamp), "__default")
        .await
        .unwrap();
    store
        .set("session.timer.last", json!(timestamp), "__default")
        .await
        .unwrap();
    store
        .set("session.timer.now", json!(timestamp), "__default")
        .await
        .unwrap();

    store.close().await.unwrap();
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[tokio::test]
async fn namespace_isolation() {
    let mut session = memory_session(SessionOptions::new());
    session.start().await.unwrap();

    session.set("key", "value", "ns1").await.unwrap();

    let other: Option<String> = session.get("key", "ns2").await.unwrap();
    assert_eq!(other.unwrap_or_else(|| "default".to_string()), "default");

    let same: Option<String> = session.get("key", "ns1").await.unwrap();
    assert_eq!(same, Some("value".to_string()));
}

#[tokio::test]
async fn set_returns_previous_value() {
    let mut session = memory_session(SessionOptions::new());

    assert_eq!(session.set("key", "v1", "ns").await.unwrap(), None);
    assert_eq!(
        session.set("key", "v2", "ns").await.unwrap(),
        Some(json!("v1"))
    );
}

#[tokio::test]
async fn remove_returns_previous_value() {
    let mut session = memory_session(SessionOptions::new());

    session.set("key", "value", "ns").await.unwrap();
    assert_eq!(
        session.remove("key", "ns").await.unwrap(),
        Some(json!("value"))
    );
    assert!(!session.has("key", "ns").await.unwrap());
    assert_eq!(session.remove("key", "ns").await.unwrap(), None);
}

#[tokio::test]
async fn clear_leaves_other_namespaces_alone() {
    let mut session = memory_session(SessionOptions::new());

    session.set("a", 1, "ns1").await.unwrap();
    session.set("b", 2, "ns2").await.unwrap();

    session.clear("ns1").await.unwrap();

    assert!(!session.has("a", "ns1").await.unwrap());
    let b: Option<i32> = session.get("b", "ns2").await.unwrap();
    assert_eq!(b, Some(2));
}

#[tokio::test]
async fn double_start_is_idempotent() {
    let mut session = memory_session(SessionOptions::new());

    session.start().await.unwrap();
    session.start().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);

    let counter: Option<u64> = session.get("session.counter", "default").await.unwrap();
    assert_eq!(counter, Some(1));
    assert!(session.is_new().await.unwrap());
}

#[tokio::test]
async fn session_expires_past_the_window() {
    let handler = MemoryHandler::new();
    let id = generate_session_id();

    // Last activity 61 seconds ago against a one-minute expiry
    seed_timers(&handler, &id, now() - 61).await;

    let store = NativeStorage::new(handler).with_id(&id);
    let mut session = Session::new(store, SessionOptions::new().with_expire(1));

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Expired);
}

#[tokio::test]
async fn session_survives_within_the_window() {
    let handler = MemoryHandler::new();
    let id = generate_session_id();

    // Last activity 59 seconds ago against a one-minute expiry
    seed_timers(&handler, &id, now() - 59).await;

    let store = NativeStorage::new(handler).with_id(&id);
    let mut session = Session::new(store, SessionOptions::new().with_expire(1));

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn zero_expire_never_expires() {
    let handler = MemoryHandler::new();
    let id = generate_session_id();

    seed_timers(&handler, &id, now() - 86_400).await;

    let store = NativeStorage::new(handler).with_id(&id);
    let mut session = Session::new(store, SessionOptions::new().with_expire(0));

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn fix_address_rejects_a_changed_address() {
    let handler = MemoryHandler::new();
    let options = SessionOptions::new().with_security("fix_address").unwrap();

    let store = NativeStorage::new(handler.clone());
    let mut first = Session::new(store, options.clone())
        .with_client_input(ClientInput::new().with_remote_addr("203.0.113.7"));

    first.start().await.unwrap();
    assert_eq!(first.state(), SessionState::Active);
    let id = first.id().to_string();
    first.close().await.unwrap();

    // Second request claims a different address
    let store = NativeStorage::new(handler).with_id(&id);
    let mut second = Session::new(store, options)
        .with_client_input(ClientInput::new().with_remote_addr("198.51.100.9"));

    second.start().await.unwrap();
    assert_eq!(second.state(), SessionState::Error);
}

#[tokio::test]
async fn fix_address_accepts_the_same_address() {
    let handler = MemoryHandler::new();
    let options = SessionOptions::new().with_security("fix_address").unwrap();

    let store = NativeStorage::new(handler.clone());
    let mut first = Session::new(store, options.clone())
        .with_client_input(ClientInput::new().with_remote_addr("203.0.113.7"));

    first.start().await.unwrap();
    let id = first.id().to_string();
    first.close().await.unwrap();

    let store = NativeStorage::new(handler).with_id(&id);
    let mut second = Session::new(store, options)
        .with_client_input(ClientInput::new().with_remote_addr("203.0.113.7"));

    second.start().await.unwrap();
    assert_eq!(second.state(), SessionState::Active);
}

#[tokio::test]
async fn fix_browser_records_but_never_rejects() {
    let handler = MemoryHandler::new();
    let options = SessionOptions::new().with_security("fix_browser").unwrap();

    let store = NativeStorage::new(handler.clone());
    let mut first = Session::new(store, options.clone())
        .with_client_input(ClientInput::new().with_user_agent("Browser/1.0"));

    first.start().await.unwrap();
    let id = first.id().to_string();
    first.close().await.unwrap();

    let store = NativeStorage::new(handler).with_id(&id);
    let mut second = Session::new(store, options)
        .with_client_input(ClientInput::new().with_user_agent("Browser/2.0"));

    second.start().await.unwrap();

    // A mismatched user agent stays recorded at first sight and the
    // session stays active
    assert_eq!(second.state(), SessionState::Active);
    let browser: Option<String> = second
        .get("session.client.browser", "default")
        .await
        .unwrap();
    assert_eq!(browser, Some("Browser/1.0".to_string()));
}

#[tokio::test]
async fn forwarded_header_is_recorded() {
    let mut session = memory_session(SessionOptions::new());
    session.set_client_input(ClientInput::new().with_forwarded_for("203.0.113.200"));

    session.start().await.unwrap();

    let forwarded: Option<String> = session
        .get("session.client.forwarded", "default")
        .await
        .unwrap();
    assert_eq!(forwarded, Some("203.0.113.200".to_string()));
}

#[tokio::test]
async fn destroy_is_idempotent() {
    let mut session = memory_session(SessionOptions::new());

    session.start().await.unwrap();
    session.set("key", "value", "ns").await.unwrap();

    session.destroy().await.unwrap();
    assert_eq!(session.state(), SessionState::Destroyed);
    assert!(!session.has("key", "ns").await.unwrap());

    // Second destroy is a no-op success
    session.destroy().await.unwrap();
    assert_eq!(session.state(), SessionState::Destroyed);
}

#[tokio::test]
async fn destroy_revokes_the_identity() {
    let handler = MemoryHandler::new();
    let store = NativeStorage::new(handler.clone());
    let mut session = Session::new(store, SessionOptions::new());

    session.start().await.unwrap();
    let old_id = session.id().to_string();

    session.destroy().await.unwrap();

    assert_ne!(session.id(), old_id);
    assert_eq!(handler.read(&old_id).await.unwrap(), "");
}

#[tokio::test]
async fn restart_replays_data_under_a_new_identity() {
    let mut session = memory_session(SessionOptions::new());

    session.start().await.unwrap();
    session.set("key", "value", "app").await.unwrap();
    let old_id = session.id().to_string();

    session.restart().await.unwrap();

    assert_eq!(session.state(), SessionState::Active);
    assert_ne!(session.id(), old_id);

    let value: Option<String> = session.get("key", "app").await.unwrap();
    assert_eq!(value, Some("value".to_string()));

    // The counter was reseeded, not replayed from the old session
    assert!(!session.is_new().await.unwrap());
    let counter: Option<u64> = session.get("session.counter", "default").await.unwrap();
    assert_eq!(counter, Some(2));
}

#[tokio::test]
async fn fork_regenerates_the_id_and_keeps_data() {
    let mut session = memory_session(SessionOptions::new());

    session.start().await.unwrap();
    session.set("key", "value", "ns").await.unwrap();
    let old_id = session.id().to_string();

    session.fork(false).await.unwrap();

    assert_ne!(session.id(), old_id);
    let value: Option<String> = session.get("key", "ns").await.unwrap();
    assert_eq!(value, Some("value".to_string()));
}

#[tokio::test]
async fn close_transitions_to_closed() {
    let mut session = memory_session(SessionOptions::new());

    session.start().await.unwrap();
    session.close().await.unwrap();

    assert_eq!(session.state(), SessionState::Closed);
    assert!(!session.is_active());
}

#[tokio::test]
async fn observers_receive_start_and_restart() {
    struct Recorder {
        events: Mutex<Vec<SessionEvent>>,
    }

    impl SessionObserver for Recorder {
        fn on_session_event(&self, event: SessionEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    let recorder = Arc::new(Recorder {
        events: Mutex::new(Vec::new()),
    });

    let mut session = memory_session(SessionOptions::new());
    session.add_observer(recorder.clone());

    session.start().await.unwrap();
    session.restart().await.unwrap();

    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(events, vec![SessionEvent::Started, SessionEvent::Restarted]);
}

#[tokio::test]
async fn panicking_observer_does_not_abort_the_lifecycle() {
    let mut session = memory_session(SessionOptions::new());
    session.add_observer(Arc::new(|_event: SessionEvent| {
        panic!("observer went wrong")
    }));

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
}

#[tokio::test]
async fn cart_survives_a_store_reload() {
    let handler = MemoryHandler::new();
    let options = SessionOptions::new()
        .with_expire(15)
        .with_security("fix_address")
        .unwrap();
    let input = ClientInput::new().with_remote_addr("203.0.113.7");

    let store = NativeStorage::new(handler.clone());
    let mut session = Session::new(store, options.clone()).with_client_input(input.clone());

    session.start().await.unwrap();
    session.set("cart", vec!["item1"], "shop").await.unwrap();
    let id = session.id().to_string();
    session.close().await.unwrap();

    // Reload the store from the persisted blob
    let store = NativeStorage::new(handler).with_id(&id);
    let mut session = Session::new(store, options).with_client_input(input);

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);

    let cart: Vec<String> = session
        .get("cart", "shop")
        .await
        .unwrap()
        .unwrap_or_default();
    assert_eq!(cart, vec!["item1".to_string()]);
}

#[tokio::test]
async fn filesystem_backed_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let handler = FilesystemHandler::new(dir.path().to_str().unwrap())
        .await
        .unwrap();

    let store = NativeStorage::new(handler.clone());
    let mut session = Session::new(store, SessionOptions::new());

    session.start().await.unwrap();
    session.set("key", 42, "ns").await.unwrap();
    let id = session.id().to_string();
    session.close().await.unwrap();

    let store = NativeStorage::new(handler).with_id(&id);
    let mut session = Session::new(store, SessionOptions::new());

    let value: Option<i32> = session.get("key", "ns").await.unwrap();
    assert_eq!(value, Some(42));
}

#[tokio::test]
async fn counter_increments_across_requests() {
    let handler = MemoryHandler::new();

    let store = NativeStorage::new(handler.clone());
    let mut first = Session::new(store, SessionOptions::new());
    first.start().await.unwrap();
    assert!(first.is_new().await.unwrap());
    let id = first.id().to_string();
    first.close().await.unwrap();

    let store = NativeStorage::new(handler).with_id(&id);
    let mut second = Session::new(store, SessionOptions::new());
    second.start().await.unwrap();

    assert!(!second.is_new().await.unwrap());
    let counter: Option<u64> = second.get("session.counter", "default").await.unwrap();
    assert_eq!(counter, Some(2));
}
