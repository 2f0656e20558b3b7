//! End-to-end sync scenarios against the in-memory remote.

use std::sync::Arc;
use subtrack_sync_engine::LocalReplica;
use subtrack_sync_protocol::{
    ConflictAction, ConflictStrategy, NewOperation, OperationKind, SubscriptionPatch, SyncStatus,
};
use subtrack_testkit::prelude::*;

#[tokio::test]
async fn netflix_created_offline_is_pushed_once() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_reachable(false);
    let client = TestClient::new(Arc::clone(&remote), test_config());

    let a = subscription_at("A", netflix(), "2024-01-01T00:00:00Z");
    client.replica().set(a.clone()).unwrap();
    client
        .log()
        .enqueue(NewOperation::create("A", a.to_payload().unwrap()));
    assert!(!client.engine().sync().await.success);

    remote.set_reachable(true);
    let result = client.engine().sync().await;

    assert!(result.success, "{:?}", result.error);
    let creates: Vec<_> = remote
        .applied()
        .into_iter()
        .filter(|op| op.kind == OperationKind::Create && op.entity_id == "A")
        .collect();
    assert_eq!(creates.len(), 1);
    assert!(client.log().is_empty());
    assert_eq!(client.engine().status(), SyncStatus::Idle);

    let stored = remote.get("A").unwrap();
    assert_eq!(stored.name, "Netflix");
    assert_eq!(stored.price, 9.99);
}

#[tokio::test]
async fn newer_remote_overwrites_local_without_queuing() {
    let remote = Arc::new(InMemoryRemote::with_rows([subscription_at(
        "B",
        spotify(),
        "2024-02-01T00:00:00Z",
    )]));
    let client = TestClient::new(Arc::clone(&remote), test_config());
    client
        .replica()
        .set(subscription_at("B", netflix(), "2024-01-01T00:00:00Z"))
        .unwrap();

    let result = client.engine().sync().await;

    assert!(result.success);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].action, ConflictAction::AdoptRemote);
    assert_eq!(client.replica().get("B").unwrap(), remote.get("B"));
    assert!(client.log().is_empty());
}

#[tokio::test]
async fn unreachable_remote_sees_no_calls() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_reachable(false);
    let client = TestClient::new(Arc::clone(&remote), test_config());
    client.service.add(netflix()).unwrap();

    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _handle = client
        .engine()
        .on_status_change(move |status| sink.lock().push(status));

    let result = client.engine().sync().await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Offline"));
    assert_eq!(client.engine().status(), SyncStatus::Offline);
    assert_eq!(*seen.lock(), vec![SyncStatus::Offline]);
    assert!(remote.applied().is_empty());
    assert_eq!(remote.fetch_count(), 0);
    assert_eq!(client.log().size(), 1);
}

#[tokio::test]
async fn client_wins_pushes_older_local_version() {
    let remote = Arc::new(InMemoryRemote::with_rows([subscription_at(
        "C",
        netflix(),
        "2024-05-01T00:00:00Z",
    )]));
    let client = TestClient::new(
        Arc::clone(&remote),
        test_config().with_conflict_strategy(ConflictStrategy::ClientWins),
    );
    let local = subscription_at("C", cloud_storage(), "2024-01-01T00:00:00Z");
    client.replica().set(local.clone()).unwrap();

    let first = client.engine().sync().await;
    assert_eq!(first.conflicts[0].action, ConflictAction::PushLocal);
    assert_eq!(client.replica().get("C").unwrap(), Some(local));
    assert_eq!(client.log().size(), 1);

    let second = client.engine().sync().await;
    assert!(second.success);
    assert_eq!(second.pushed, 1);
    assert!(second.conflicts.is_empty());
    assert!(client.log().is_empty());
    assert_eq!(remote.get("C").unwrap().name, "Cloud Drive");
    assert!(same_rows(&client.rows(), &remote.rows()));
}

#[tokio::test]
async fn server_assigned_ids_are_adopted() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_assign_ids(true);
    let client = TestClient::new(Arc::clone(&remote), test_config());

    let added = client.service.add(netflix()).unwrap();
    client
        .service
        .update(
            &added.id,
            SubscriptionPatch {
                price: Some(12.99),
                ..Default::default()
            },
        )
        .unwrap();

    let result = client.engine().sync().await;

    assert!(result.success, "{:?}", result.error);
    let rows = remote.rows();
    assert_eq!(rows.len(), 1);
    assert_ne!(rows[0].id, added.id);
    assert_eq!(rows[0].price, 12.99);

    let local = client.rows();
    assert_eq!(local.len(), 1);
    assert_eq!(local[0].id, rows[0].id);
    assert!(client.service.get(&added.id).unwrap().is_none());
}

#[tokio::test]
async fn dropped_operation_can_be_retried() {
    let remote = Arc::new(InMemoryRemote::new());
    let client = TestClient::new(
        Arc::clone(&remote),
        test_config().with_max_retry_attempts(1),
    );
    remote.fail_next(1);
    let added = client.service.add(netflix()).unwrap();

    let result = client.engine().sync().await;
    assert_eq!(result.dropped.len(), 1);
    assert!(client.service.get(&added.id).unwrap().is_none());

    let dead = client.log().dead_letters();
    assert_eq!(dead[0].attempts, 1);
    assert!(dead[0].error.as_deref().unwrap().contains("injected failure"));
    assert!(client.log().retry_dead_letter(&dead[0].id));

    let result = client.engine().sync().await;
    assert!(result.success);
    assert_eq!(result.pushed, 1);
    assert!(remote.get(&added.id).is_some());
    assert!(client.service.get(&added.id).unwrap().is_some());
    assert_eq!(client.engine().stats().operations_dropped, 1);
}

#[tokio::test]
async fn queue_survives_restart() {
    let remote = Arc::new(InMemoryRemote::new());
    remote.set_reachable(false);
    let client = TestClient::file(Arc::clone(&remote), test_config());

    let kept = client.service.add(netflix()).unwrap();
    let removed = client.service.add(spotify()).unwrap();
    client.service.delete(&removed.id).unwrap();
    client.engine().sync().await;

    let client = client.restart();
    assert_eq!(client.log().size(), 3);
    assert_eq!(client.rows().len(), 1);

    remote.set_reachable(true);
    let result = client.engine().sync().await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.pushed, 3);
    assert_eq!(remote.rows().len(), 1);
    assert_eq!(remote.rows()[0].id, kept.id);
}

#[tokio::test]
async fn one_failing_entity_does_not_block_others() {
    let remote = Arc::new(InMemoryRemote::new());
    let client = TestClient::new(Arc::clone(&remote), test_config());

    let stuck = client.service.add(netflix()).unwrap();
    let fine = client.service.add(spotify()).unwrap();
    remote.fail_entity(&stuck.id);

    let result = client.engine().sync().await;

    assert!(result.success);
    assert_eq!(result.pushed, 1);
    assert!(remote.get(&fine.id).is_some());
    assert!(client.service.get(&stuck.id).unwrap().is_some());
    assert_eq!(client.log().all()[0].entity_id, stuck.id);
}
