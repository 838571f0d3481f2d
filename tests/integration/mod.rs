//! Integration tests for spacekeep spaces on disk

mod blob_store;
mod cli;
mod end_to_end;
mod queue_flush;

use spacekeep::op::OpsParser;
use spacekeep::persist::FileSystemPersistence;
use spacekeep::space::SpaceLayout;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fresh space with a filesystem store. Must be called inside a Tokio runtime.
pub fn open_space(temp: &TempDir, space_id: &str) -> Arc<FileSystemPersistence> {
    let layout = SpaceLayout::new(temp.path());
    layout.init(space_id, Some("test space")).unwrap();
    let parser = Arc::new(OpsParser::spawn(Duration::from_secs(5)).unwrap());
    Arc::new(FileSystemPersistence::open(layout, parser).unwrap())
}
