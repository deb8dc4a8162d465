use std::sync::Arc;
use std::time::Duration;

use super::support::{
    ids, message_frame, notification, notification_frame, text_message, wait_for, StubApi,
};
use crate::config::Config;
use crate::error::SyncError;
use crate::protocol::{FrameAction, MessageContent, Topic};
use crate::session::SyncSession;
use crate::transport::mock::MockTransport;

fn test_config() -> Config {
    Config {
        // Keep the periodic poller out of the way; tests poke it
        // explicitly when they need a tick.
        poll_interval: Duration::from_secs(3600),
        ..Config::default()
    }
}

fn session_parts() -> (Arc<MockTransport>, Arc<StubApi>, SyncSession) {
    let transport = Arc::new(MockTransport::new());
    let api = Arc::new(StubApi::new());
    let session = SyncSession::attach(&test_config(), transport.clone(), api.clone());
    (transport, api, session)
}

#[tokio::test]
async fn reconnect_replay_does_not_duplicate_messages() {
    let (transport, _api, session) = session_parts();
    let topic = Topic::Group(42);

    // Subscribed while disconnected; intent goes out on connect.
    let mut rx = session.subscribe(topic).await;
    assert!(transport.sent_frames().is_empty());

    transport.connect_epoch(1);
    assert!(
        wait_for(|| transport
            .sent_frames()
            .iter()
            .any(|f| f.action == FrameAction::Subscribe && f.topic == topic))
        .await
    );

    transport.push_frame(1, message_frame(topic, text_message(5, "hi")));
    assert!(wait_for(|| ids(&session.history(topic)) == vec![5]).await);

    // Reconnect; the server replays id 5 and appends id 6.
    transport.clear_sent();
    transport.connect_epoch(2);
    assert!(wait_for(|| !transport.sent_frames().is_empty()).await);

    transport.push_frame(2, message_frame(topic, text_message(5, "hi")));
    transport.push_frame(2, message_frame(topic, text_message(6, "again")));
    assert!(wait_for(|| ids(&session.history(topic)) == vec![5, 6]).await);

    assert_eq!(rx.recv().await.unwrap().id, 5);
    assert_eq!(rx.recv().await.unwrap().id, 6);
    assert!(rx.try_recv().is_err());

    session.close().await;
}

#[tokio::test]
async fn stale_epoch_frames_are_discarded() {
    let (transport, _api, session) = session_parts();
    let topic = Topic::Group(42);
    session.subscribe(topic).await;

    transport.connect_epoch(2);
    transport.push_frame(2, message_frame(topic, text_message(6, "live")));
    assert!(wait_for(|| ids(&session.history(topic)) == vec![6]).await);

    // A slow in-flight frame from the dead epoch-1 connection arrives
    // after epoch 2 started: it must not mutate any buffer.
    transport.push_frame(1, message_frame(topic, text_message(7, "stale")));
    transport.push_frame(2, message_frame(topic, text_message(8, "live")));
    assert!(wait_for(|| ids(&session.history(topic)) == vec![6, 8]).await);

    session.close().await;
}

#[tokio::test]
async fn send_fails_fast_while_disconnected() {
    let (_transport, _api, session) = session_parts();

    let err = session
        .send(
            Topic::Group(42),
            MessageContent::Text {
                body: "hello".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotConnected));

    session.close().await;
}

#[tokio::test]
async fn send_reports_terminal_loss() {
    let (transport, _api, session) = session_parts();
    transport.mark_lost();

    let err = session
        .send(
            Topic::Group(42),
            MessageContent::Text {
                body: "hello".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ConnectionLost { .. }));

    session.close().await;
}

#[tokio::test]
async fn pushed_notifications_reach_the_reconciler() {
    let (transport, api, session) = session_parts();
    let account = Topic::Account(7);
    session.subscribe(account).await;
    transport.connect_epoch(1);

    // Keep the poller's snapshot consistent with the push so tick
    // ordering cannot matter.
    api.set_notifications(vec![notification(11, false)]);
    transport.push_frame(1, notification_frame(account, notification(11, false)));

    assert!(wait_for_unread(&session, 1).await);
    let state = session.notification_state().await;
    assert_eq!(state.notifications[0].id, 11);
    assert_eq!(state.unread, 1);

    session.close().await;
}

async fn wait_for_unread(session: &SyncSession, expected: u64) -> bool {
    for _ in 0..100 {
        if session.notification_state().await.unread == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn load_history_merges_with_realtime_buffer() {
    let (transport, api, session) = session_parts();
    let topic = Topic::Group(42);
    session.subscribe(topic).await;
    transport.connect_epoch(1);

    transport.push_frame(1, message_frame(topic, text_message(6, "realtime")));
    assert!(wait_for(|| ids(&session.history(topic)) == vec![6]).await);

    *api.history.lock() = vec![text_message(4, "old"), text_message(6, "dup")];
    let merged = session.load_history(topic).await.unwrap();
    assert_eq!(ids(&merged), vec![4, 6]);

    session.close().await;
}

#[tokio::test]
async fn unsubscribe_keeps_history_and_stops_delivery() {
    let (transport, _api, session) = session_parts();
    let topic = Topic::Group(42);
    let mut rx = session.subscribe(topic).await;
    transport.connect_epoch(1);

    transport.push_frame(1, message_frame(topic, text_message(1, "a")));
    assert_eq!(rx.recv().await.unwrap().id, 1);

    session.unsubscribe(topic).await;
    assert!(
        wait_for(|| transport
            .sent_frames()
            .iter()
            .any(|f| f.action == FrameAction::Unsubscribe))
        .await
    );
    assert_eq!(ids(&session.history(topic)), vec![1]);
    assert!(matches!(
        rx.recv().await,
        Err(tokio::sync::broadcast::error::RecvError::Closed)
    ));

    session.close().await;
}
