use spacekeep::op::Operation;
use spacekeep::persist::{AutoSaver, PersistenceQueue, SpacePersistence};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use super::open_space;

#[tokio::test]
async fn repeated_flushes_append_without_duplicates() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");
    let queue = PersistenceQueue::new("s", store.clone());

    for counter in 1..=3u64 {
        queue.add_ops("t", vec![Operation::new_move(counter, "A", format!("v{counter}"), None)]);
        assert!(queue.save_data().await.is_clean());
    }
    // Nothing pending: another save writes nothing.
    let report = queue.save_data().await;
    assert!(report.trees_saved.is_empty());

    let ops = store.get_tree_ops("s", "t").await.unwrap();
    let counters: Vec<u64> = ops.iter().map(|op| op.id().counter).collect();
    assert_eq!(counters, vec![1, 2, 3]);
}

#[tokio::test]
async fn secrets_survive_a_new_queue() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");

    let queue = PersistenceQueue::new("s", store.clone());
    queue.add_secret("api-token", "abc");
    queue.add_secret("other", "1");
    assert!(queue.save_data().await.is_clean());
    drop(queue);

    let queue = PersistenceQueue::new("s", store.clone());
    queue.add_secret("other", "2");
    assert!(queue.save_data().await.is_clean());

    let saved = queue.saved_secrets().await.unwrap();
    assert_eq!(saved.get("api-token").map(String::as_str), Some("abc"));
    assert_eq!(saved.get("other").map(String::as_str), Some("2"));
}

#[tokio::test]
async fn queue_for_wrong_space_keeps_data_pending() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");
    let queue = PersistenceQueue::new("someone-else", store.clone());

    queue.add_ops("t", vec![Operation::new_move(1, "A", "v1", None)]);
    let report = queue.save_data().await;

    assert_eq!(report.trees_failed.len(), 1);
    assert!(queue.has_pending_ops_for("t"));
    assert_eq!(queue.pending_ops_count(), 1);
}

#[tokio::test]
async fn autosaver_drains_queue_in_background() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");
    let queue = Arc::new(PersistenceQueue::new("s", store.clone()));
    let saver = AutoSaver::start(Arc::clone(&queue), Duration::from_millis(10));

    queue.add_ops("t", vec![Operation::new_set_property(1, "A", "v1", "done", true)]);
    queue.add_secret("k", "v");

    let report = saver.stop().await;
    assert!(report.is_clean());
    assert!(!queue.has_pending_data());
    assert_eq!(store.get_tree_ops("s", "t").await.unwrap().len(), 1);
    assert_eq!(store.get_all_secrets("s").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unwritable_origin_is_dropped_without_duplicating_the_rest() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");
    let queue = PersistenceQueue::new("s", store.clone());

    queue.add_ops(
        "t",
        vec![
            Operation::new_move(1, "A", "v1", None),
            Operation::new_move(2, "bad/origin", "v2", None),
        ],
    );
    let report = queue.save_data().await;
    assert_eq!(report.trees_failed.len(), 1);
    assert_eq!(report.ops_rejected.len(), 1);
    assert_eq!(report.ops_rejected[0].1.origin_id(), "bad/origin");
    assert!(!queue.has_pending_ops());

    for _ in 0..2 {
        assert!(queue.save_data().await.is_clean());
    }
    queue.add_ops("t", vec![Operation::new_move(3, "A", "v3", None)]);
    assert!(queue.save_data().await.is_clean());

    let ids: Vec<String> = store
        .get_tree_ops("s", "t")
        .await
        .unwrap()
        .iter()
        .map(|op| op.id().to_string())
        .collect();
    assert_eq!(ids, vec!["1@A", "3@A"]);
    assert_eq!(queue.pending_ops_count(), 0);
}

#[tokio::test]
async fn failed_origin_is_retried_alone() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "s");
    let queue = PersistenceQueue::new("s", store.clone());
    // A directory in place of B's shard file makes only B's append fail.
    let blocked = store
        .layout()
        .shard_path("t", chrono::Utc::now().date_naive(), "B")
        .unwrap();
    std::fs::create_dir_all(&blocked).unwrap();

    queue.add_ops(
        "t",
        vec![
            Operation::new_move(1, "A", "a1", None),
            Operation::new_move(1, "B", "b1", None),
            Operation::new_move(2, "A", "a2", None),
        ],
    );
    let report = queue.save_data().await;
    assert_eq!(report.trees_failed.len(), 1);
    assert!(report.ops_rejected.is_empty());
    assert_eq!(queue.pending_ops_count(), 1);

    std::fs::remove_dir(&blocked).unwrap();
    queue.add_ops("t", vec![Operation::new_move(2, "B", "b2", None)]);
    assert!(queue.save_data().await.is_clean());

    let ops = store.get_tree_ops("s", "t").await.unwrap();
    let targets: Vec<&str> = ops.iter().map(|op| op.target_id()).collect();
    assert_eq!(targets, vec!["a1", "a2", "b1", "b2"]);
}
