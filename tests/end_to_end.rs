//! End-to-end scenarios against the public `Drive` surface, run over
//! the in-memory `ChatPlatform` double. One file per concern rather
//! than one combined `#[cfg(test)]` module, since these exercise the
//! crate's public API only.

use std::sync::Arc;

use drivecord::{bootstrap, memory_platform::MemoryPlatform, ChatPlatform, Drive, DriveError, WriteOptions};

const USER: u64 = 1;
const BOT: u64 = 0;

async fn fresh_drive() -> Drive {
    let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(BOT));
    let (_pointers, drive) = bootstrap::initialize_drive(platform).await.unwrap();
    drive
}

fn field(export: &str, name: &str, index: usize) -> String {
    export
        .split('|')
        .find(|entry| entry.starts_with(&format!("F:{name}:")))
        .unwrap_or_else(|| panic!("no file entry for {name} in {export:?}"))
        .split(':')
        .nth(index)
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn create_and_read_round_trips_small_content() {
    let drive = fresh_drive().await;
    drive.create_file(USER, "hello.txt").await.unwrap();
    drive.write(USER, "hello.txt", b"hi", WriteOptions::default()).await.unwrap();

    let bytes = drive.read(USER, "hello.txt").await.unwrap();
    assert_eq!(bytes, b"hi");

    let export = drive.list_structure().await.unwrap();
    assert_eq!(field(&export, "hello.txt", 4), "2");
}

#[tokio::test]
async fn write_growing_past_one_chunk_round_trips() {
    let drive = fresh_drive().await;
    drive.create_file(USER, "big").await.unwrap();
    let payload = vec![b'A'; 3000];
    drive.write(USER, "big", &payload, WriteOptions::default()).await.unwrap();

    let bytes = drive.read(USER, "big").await.unwrap();
    assert_eq!(bytes, payload);

    let export = drive.list_structure().await.unwrap();
    assert_eq!(field(&export, "big", 4), "3000");
}

#[tokio::test]
async fn write_shrinking_back_to_one_chunk_frees_the_rest() {
    let drive = fresh_drive().await;
    drive.create_file(USER, "big").await.unwrap();
    drive.write(USER, "big", &vec![b'A'; 3000], WriteOptions::default()).await.unwrap();
    let usage_grown = drive.memory_usage().await;

    drive.write(USER, "big", b"hi", WriteOptions::default()).await.unwrap();
    let bytes = drive.read(USER, "big").await.unwrap();
    assert_eq!(bytes, b"hi");

    let usage_shrunk = drive.memory_usage().await;
    assert!(usage_shrunk < usage_grown, "shrinking a file must free its dropped chunks");
}

#[tokio::test]
async fn writing_the_empty_string_preserves_the_blank_file_chunk() {
    let drive = fresh_drive().await;
    drive.create_file(USER, "empty.txt").await.unwrap();
    drive.write(USER, "empty.txt", b"", WriteOptions::default()).await.unwrap();

    let bytes = drive.read(USER, "empty.txt").await.unwrap();
    assert_eq!(bytes, b"");
}

#[tokio::test]
async fn create_file_rejects_a_name_already_used_by_a_sibling() {
    let drive = fresh_drive().await;
    drive.create_directory(USER, "a").await.unwrap();
    let err = drive.create_file(USER, "a").await.unwrap_err();
    assert_eq!(err, DriveError::NameInUse);
}

#[tokio::test]
async fn root_cannot_be_renamed_or_deleted() {
    let drive = fresh_drive().await;
    assert_eq!(drive.rename(USER, "~/", "nope").await.unwrap_err(), DriveError::CannotRename);
    assert_eq!(drive.delete(USER, "~/").await.unwrap_err(), DriveError::PermissionError);
}

#[tokio::test]
async fn nested_tree_survives_export_and_matches_structure() {
    let drive = fresh_drive().await;
    drive.create_directory(USER, "animals").await.unwrap();
    drive.create_directory(USER, "animals/cats").await.unwrap();
    drive.create_directory(USER, "animals/dogs").await.unwrap();
    drive.create_file(USER, "animals/pig.txt").await.unwrap();
    drive.create_directory(USER, "food").await.unwrap();
    drive.create_directory(USER, "food/mc").await.unwrap();
    drive.create_directory(USER, "food/mc/a").await.unwrap();
    drive.create_directory(USER, "food/mc/a/b").await.unwrap();
    drive.create_directory(USER, "food/mc/a/b/c").await.unwrap();
    drive.create_directory(USER, "food/mc/a/b/c/d").await.unwrap();
    drive.create_file(USER, "food/mc/a/b/c/d/x").await.unwrap();

    let rendered = drive.render_tree().await.unwrap();
    for name in ["animals", "cats", "dogs", "pig.txt", "food", "mc", "x"] {
        assert!(rendered.contains(name), "rendered tree missing {name}:\n{rendered}");
    }

    let export = drive.list_structure().await.unwrap();
    assert!(export.starts_with("D:~|"));
    assert!(export.ends_with('?'));
}

#[tokio::test]
async fn delete_unlinking_a_cwd_ancestor_resets_cwd_on_next_lookup() {
    let drive = fresh_drive().await;
    drive.create_directory(USER, "a").await.unwrap();
    drive.create_directory(USER, "a/b").await.unwrap();
    drive.create_file(USER, "a/b/file.txt").await.unwrap();

    // there is no dedicated `cd`/`get_cwd` on the public surface, so we
    // exercise the recovery path indirectly: an operation against a
    // path under the removed subtree must fail as "not found" rather
    // than panicking or silently succeeding against stale state.
    drive.delete(USER, "a").await.unwrap();
    let err = drive.read(USER, "a/b/file.txt").await.unwrap_err();
    assert_eq!(err, DriveError::InvalidPath);
}

#[tokio::test]
async fn recache_rebuilds_to_the_same_totals_after_cache_message_loss() {
    let platform: Arc<dyn ChatPlatform> = Arc::new(MemoryPlatform::new(BOT));
    let (_pointers, drive) = bootstrap::initialize_drive(platform.clone()).await.unwrap();

    drive.create_file(USER, "a").await.unwrap();
    drive.write(USER, "a", &vec![b'x'; 5000], WriteOptions::default()).await.unwrap();
    drive.create_file(USER, "b").await.unwrap();
    drive.write(USER, "b", b"small", WriteOptions::default()).await.unwrap();

    let before = drive.memory_usage().await;
    assert!(before > 0);

    // Simulate loss of the `_cache` message: find the `data_0/_cache`
    // channel through the same platform handle the drive was built
    // from and delete its only message.
    let categories = platform.list_categories().await.unwrap();
    let (data0, _) = categories.iter().find(|(_, name)| name == "data_0").unwrap();
    let channels = platform.list_channels(*data0).await.unwrap();
    let (cache_channel, _) = channels.iter().find(|(_, name)| name == "_cache").unwrap();
    let recent = platform.recent_messages(*cache_channel, 1).await.unwrap();
    for msg in recent {
        platform.delete_message(*cache_channel, msg.id).await.unwrap();
    }

    drive.recache().await.unwrap();
    let after = drive.memory_usage().await;
    assert_eq!(before, after, "rebuilding the cache must reproduce the totals that were live before the loss");
}
