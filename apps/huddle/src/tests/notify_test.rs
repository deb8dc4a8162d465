use std::sync::Arc;

use super::support::{notification, StubApi};
use crate::error::SyncError;
use crate::notify::NotificationReconciler;

fn reconciler() -> (Arc<StubApi>, NotificationReconciler) {
    let api = Arc::new(StubApi::new());
    let reconciler = NotificationReconciler::new(api.clone());
    (api, reconciler)
}

#[tokio::test]
async fn unread_count_is_always_derived() {
    let (_api, reconciler) = reconciler();
    reconciler
        .apply_snapshot(vec![
            notification(1, false),
            notification(2, true),
            notification(3, false),
        ])
        .await;

    let state = reconciler.state().await;
    assert_eq!(state.unread, 2);
    assert_eq!(
        state.unread,
        state.notifications.iter().filter(|n| !n.read).count() as u64
    );
}

#[tokio::test]
async fn push_redelivery_is_idempotent() {
    let (_api, reconciler) = reconciler();
    reconciler.apply_push(notification(7, false)).await;
    reconciler.apply_push(notification(7, false)).await;

    let state = reconciler.state().await;
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.unread, 1);
}

#[tokio::test]
async fn poll_wins_read_state_conflicts() {
    let (_api, reconciler) = reconciler();
    reconciler.apply_snapshot(vec![notification(9, false)]).await;
    reconciler.mark_read(9).await.unwrap();
    assert_eq!(reconciler.unread_count().await, 0);

    // Authoritative snapshot still says unread: it wins.
    reconciler.apply_snapshot(vec![notification(9, false)]).await;
    let state = reconciler.state().await;
    assert!(!state.notifications[0].read);
    assert_eq!(state.unread, 1);
}

#[tokio::test]
async fn snapshot_omission_removes_notification() {
    let (_api, reconciler) = reconciler();
    reconciler
        .apply_snapshot(vec![notification(3, false), notification(4, false)])
        .await;
    assert_eq!(reconciler.unread_count().await, 2);

    reconciler.apply_snapshot(vec![notification(4, false)]).await;
    let state = reconciler.state().await;
    assert_eq!(state.notifications.len(), 1);
    assert_eq!(state.notifications[0].id, 4);
    assert_eq!(state.unread, 1);
}

#[tokio::test]
async fn failed_mark_read_rolls_back() {
    let (api, reconciler) = reconciler();
    reconciler.apply_snapshot(vec![notification(9, false)]).await;
    api.set_fail_mutations(true);

    let err = reconciler.mark_read(9).await.unwrap_err();
    assert!(matches!(err, SyncError::MutationRejected(_)));
    assert_eq!(reconciler.unread_count().await, 1);
    assert!(!reconciler.state().await.notifications[0].read);
}

#[tokio::test]
async fn mark_read_of_unknown_id_is_rejected() {
    let (_api, reconciler) = reconciler();
    assert!(matches!(
        reconciler.mark_read(99).await,
        Err(SyncError::UnknownNotification(99))
    ));
}

#[tokio::test]
async fn mark_read_is_confirmed_with_server() {
    let (api, reconciler) = reconciler();
    reconciler.apply_snapshot(vec![notification(5, false)]).await;

    reconciler.mark_read(5).await.unwrap();
    assert_eq!(reconciler.unread_count().await, 0);
    assert!(api.calls().contains(&"mark_read:5".to_string()));

    // Already-read ids do not produce another API call.
    reconciler.mark_read(5).await.unwrap();
    assert_eq!(
        api.calls().iter().filter(|c| *c == "mark_read:5").count(),
        1
    );
}

#[tokio::test]
async fn failed_mark_all_read_rolls_back_only_changed_ids() {
    let (api, reconciler) = reconciler();
    reconciler
        .apply_snapshot(vec![notification(1, false), notification(2, true)])
        .await;
    api.set_fail_mutations(true);

    assert!(reconciler.mark_all_read().await.is_err());
    let state = reconciler.state().await;
    assert_eq!(state.unread, 1);
    let n2 = state.notifications.iter().find(|n| n.id == 2).unwrap();
    assert!(n2.read);
}

#[tokio::test]
async fn failed_remove_reinserts() {
    let (api, reconciler) = reconciler();
    reconciler.apply_snapshot(vec![notification(6, false)]).await;
    api.set_fail_mutations(true);

    assert!(reconciler.remove(6).await.is_err());
    assert_eq!(reconciler.state().await.notifications.len(), 1);
    assert_eq!(reconciler.unread_count().await, 1);
}

#[tokio::test]
async fn remove_confirms_and_drops() {
    let (api, reconciler) = reconciler();
    reconciler.apply_snapshot(vec![notification(6, false)]).await;

    reconciler.remove(6).await.unwrap();
    assert!(reconciler.state().await.notifications.is_empty());
    assert!(api.calls().contains(&"delete:6".to_string()));
}

#[tokio::test]
async fn failed_clear_all_restores_everything() {
    let (api, reconciler) = reconciler();
    reconciler
        .apply_snapshot(vec![notification(1, false), notification(2, true)])
        .await;
    api.set_fail_mutations(true);

    assert!(reconciler.clear_all().await.is_err());
    let state = reconciler.state().await;
    assert_eq!(state.notifications.len(), 2);
    assert_eq!(state.unread, 1);
}

#[tokio::test]
async fn state_sorts_newest_first() {
    let (_api, reconciler) = reconciler();
    reconciler
        .apply_snapshot(vec![notification(1, false), notification(3, false), notification(2, false)])
        .await;
    let state = reconciler.state().await;
    let order: Vec<u64> = state.notifications.iter().map(|n| n.id).collect();
    assert_eq!(order, vec![3, 2, 1]);
}
