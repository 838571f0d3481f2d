use chrono::Utc;
use spacekeep::op::{Operation, PropertyUpdate, PropertyValue};
use spacekeep::persist::{PersistenceQueue, SpacePersistence};
use tempfile::TempDir;

use super::open_space;

#[tokio::test]
async fn saved_ops_land_in_todays_shard_in_order() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "space-1");
    let queue = PersistenceQueue::new("space-1", store.clone());

    queue.add_ops(
        "tree-1",
        vec![
            Operation::new_move(1, "A", "v1", None),
            Operation::new_set_property(2, "A", "v1", "name", "Test"),
        ],
    );
    let report = queue.save_data().await;
    assert!(report.is_clean());
    assert_eq!(report.trees_saved, vec![("tree-1".to_string(), 2)]);

    let today = Utc::now().date_naive();
    let shard = temp
        .path()
        .join("space-v1")
        .join("ops")
        .join("tree-1")
        .join(today.format("%Y").to_string())
        .join(today.format("%m").to_string())
        .join(today.format("%d").to_string())
        .join("A.jsonl");
    let content = std::fs::read_to_string(&shard).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines, vec![r#"["m",1,"v1",null]"#, r#"["p",2,"v1","name","Test"]"#]);

    let loaded = store.get_tree_ops("space-1", "tree-1").await.unwrap();
    assert_eq!(loaded.len(), 2);
    match &loaded[1] {
        Operation::SetProperty(op) => {
            assert_eq!(op.id.to_string(), "2@A");
            assert_eq!(op.value, PropertyUpdate::Set(PropertyValue::String("Test".into())));
        }
        other => panic!("expected a property op, got {:?}", other),
    }
}

#[tokio::test]
async fn second_origin_gets_its_own_shard_and_reload_merges_both() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "space-1");
    let queue = PersistenceQueue::new("space-1", store.clone());

    queue.add_ops(
        "tree-1",
        vec![
            Operation::new_move(1, "A", "v1", None),
            Operation::new_move(1, "B", "v2", Some("v1")),
            Operation::new_clear_property(2, "A", "v1", "name"),
        ],
    );
    assert!(queue.save_data().await.is_clean());

    let shards = store.list_tree_shards("tree-1").await.unwrap();
    let origins: Vec<&str> = shards.iter().map(|(_, s)| s.origin_id.as_str()).collect();
    assert_eq!(origins, vec!["A", "B"]);

    let (a_path, _) = &shards[0];
    let a_content = std::fs::read_to_string(a_path).unwrap();
    assert_eq!(a_content, "[\"m\",1,\"v1\",null]\n[\"p\",2,\"v1\",\"name\",{}]\n");

    let loaded = store.get_tree_ops("space-1", "tree-1").await.unwrap();
    assert_eq!(loaded.len(), 3);
    assert!(loaded.iter().any(|op| op.origin_id() == "B"));
}

#[tokio::test]
async fn corrupt_line_in_shard_is_skipped_on_load() {
    let temp = TempDir::new().unwrap();
    let store = open_space(&temp, "space-1");
    let queue = PersistenceQueue::new("space-1", store.clone());
    queue.add_ops("tree-1", vec![Operation::new_move(1, "A", "v1", None)]);
    assert!(queue.save_data().await.is_clean());

    let (path, _) = store.list_tree_shards("tree-1").await.unwrap().remove(0);
    let mut content = std::fs::read_to_string(&path).unwrap();
    content.push_str("[\"m\",\"not-a-counter\",\"v2\",null]\n");
    content.push_str("[\"p\",3,\"v1\",\"k\",true]\n");
    std::fs::write(&path, content).unwrap();

    let loaded = store.get_tree_ops("space-1", "tree-1").await.unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded[1].id().to_string(), "3@A");
}
