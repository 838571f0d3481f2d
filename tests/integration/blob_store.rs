use rand::RngCore;
use spacekeep::blob::{BlobId, BlobStore};
use spacekeep::space::SpaceLayout;
use tempfile::TempDir;
use walkdir::WalkDir;

fn store(temp: &TempDir) -> BlobStore {
    let layout = SpaceLayout::new(temp.path());
    layout.init("s", None).unwrap();
    BlobStore::new(layout.files_dir())
}

fn stored_files(store: &BlobStore) -> usize {
    WalkDir::new(store.root())
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count()
}

#[tokio::test]
async fn identical_content_is_stored_once() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);

    let a = store.put_bytes(b"same bytes", Some("text/plain")).await.unwrap();
    let b = store.put_bytes(b"same bytes", Some("application/octet-stream")).await.unwrap();
    let c = store.put_bytes(b"other bytes", None).await.unwrap();

    assert_eq!(a.id, b.id);
    assert_ne!(a.id, c.id);
    assert_eq!(stored_files(&store), 2);
}

#[tokio::test]
async fn bytes_round_trip_at_several_sizes() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);

    let mut large = vec![0u8; 1024 * 1024 + 17];
    rand::rng().fill_bytes(&mut large);

    for bytes in [Vec::new(), b"abc".to_vec(), large] {
        let blob = store.put_bytes(&bytes, None).await.unwrap();
        assert_eq!(blob.size, bytes.len() as u64);
        assert_eq!(blob.id, BlobId::for_bytes(&bytes));
        assert!(store.exists(&blob.id).await.unwrap());
        assert_eq!(store.get_bytes(&blob.id).await.unwrap(), bytes);
    }
}

#[tokio::test]
async fn blob_path_fans_out_on_first_byte() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let blob = store.put_bytes(b"abc", None).await.unwrap();

    let expected = temp
        .path()
        .join("space-v1")
        .join("files")
        .join("sha256")
        .join("ba")
        .join("7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    assert_eq!(store.blob_path(&blob.id), expected);
    assert!(expected.is_file());
}

#[tokio::test]
async fn concurrent_puts_of_same_content_agree() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);

    let puts = (0..8).map(|_| store.put_bytes(b"raced", None));
    let results = futures::future::join_all(puts).await;

    let first = results[0].as_ref().unwrap().id.clone();
    for result in results {
        assert_eq!(result.unwrap().id, first);
    }
    assert_eq!(store.get_bytes(&first).await.unwrap(), b"raced");
    assert_eq!(stored_files(&store), 1);
}
