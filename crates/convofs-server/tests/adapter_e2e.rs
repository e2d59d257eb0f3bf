//! End-to-end tests of the adapter as a FUSE host sees it.
//!
//! # Tiers
//!
//! - **Tier 1:** path-level `VfsOps` against the in-memory backend
//! - **Tier 2:** inode-level `FuseOps`, the same calls the kernel driver makes
//! - **Tier 3:** mount lifecycle through `MountManager` with a stub transport
//!
//! Nothing here mounts a real filesystem or touches the network.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use convofs_kernel::{
    ConversationConfig, ConversationFs, FsError, MemoryConversations, Message, NamespaceTarget,
    VfsOps,
};
use convofs_server::constants::ROOT_INODE;
use convofs_server::{FuseOps, MountError, MountManager, MountTransport};

// ============================================================================
// Shared test setup
// ============================================================================

fn adapter() -> (Arc<ConversationFs>, Arc<MemoryConversations>) {
    let backend = Arc::new(MemoryConversations::new());
    let fs = Arc::new(ConversationFs::new(
        backend.clone(),
        ConversationConfig::default(),
    ));
    (fs, backend)
}

async fn conversation_ids(fs: &ConversationFs) -> Vec<String> {
    fs.readdir(Path::new("/conversations"))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect()
}

// ============================================================================
// Tier 1: path-level
// ============================================================================

#[tokio::test]
async fn resolver_ignores_index_state() {
    let (fs, _) = adapter();
    let paths = ["/", "/conversations", "/conversations/x", "/config/a/b", "/nope"];
    let before: Vec<NamespaceTarget> = paths.iter().map(|p| NamespaceTarget::resolve(p)).collect();

    fs.write(Path::new("/conversations"), 0, b"").await.unwrap();

    let after: Vec<NamespaceTarget> = paths.iter().map(|p| NamespaceTarget::resolve(p)).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn root_listing_is_fixed() {
    let (fs, _) = adapter();
    let expected = vec!["conversations", "completions", "config", "status.txt"];
    for _ in 0..3 {
        let names: Vec<String> = fs
            .readdir(Path::new("/"))
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, expected);
        fs.write(Path::new("/conversations"), 0, b"").await.unwrap();
    }
}

#[tokio::test]
async fn round_trip_contains_user_message() {
    let (fs, _) = adapter();
    let accepted = fs.write(Path::new("/conversations"), 0, b"new").await.unwrap();
    assert_eq!(accepted, 3);

    let ids = conversation_ids(&fs).await;
    assert_eq!(ids.len(), 1);
    let path = format!("/conversations/{}", ids[0]);

    fs.write(Path::new(&path), 0, b"hello").await.unwrap();
    let data = fs.read_all(Path::new(&path)).await.unwrap();
    let text = String::from_utf8(data).unwrap();
    assert!(text.contains("user: hello"), "got {text:?}");
}

#[tokio::test]
async fn read_past_end_is_empty() {
    let (fs, _) = adapter();
    fs.write(Path::new("/conversations"), 0, b"").await.unwrap();
    let id = conversation_ids(&fs).await.remove(0);
    let path = format!("/conversations/{id}");
    fs.write(Path::new(&path), 0, b"hi").await.unwrap();

    let data = fs.read(Path::new(&path), 1_000, 10).await.unwrap();
    assert!(data.is_empty());
}

#[tokio::test]
async fn unknown_id_is_not_found() {
    let (fs, _) = adapter();
    let path = Path::new("/conversations/does-not-exist");
    assert!(matches!(fs.read(path, 0, 10).await, Err(FsError::NotFound(_))));
    assert!(matches!(fs.getattr(path).await, Err(FsError::NotFound(_))));
    assert!(matches!(
        fs.write(path, 0, b"hi").await,
        Err(FsError::NotFound(_))
    ));
}

#[tokio::test]
async fn backend_outage_maps_to_unavailable() {
    let (fs, backend) = adapter();
    fs.write(Path::new("/conversations"), 0, b"").await.unwrap();
    let id = conversation_ids(&fs).await.remove(0);
    let path = format!("/conversations/{id}");

    backend.set_failing(true);
    assert!(matches!(
        fs.read(Path::new(&path), 0, 10).await,
        Err(FsError::BackendUnavailable(_))
    ));
    assert!(matches!(
        fs.write(Path::new(&path), 0, b"x").await,
        Err(FsError::BackendUnavailable(_))
    ));
    assert!(matches!(
        fs.write(Path::new("/conversations"), 0, b"").await,
        Err(FsError::BackendUnavailable(_))
    ));
    assert_eq!(conversation_ids(&fs).await, vec![id]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_yield_distinct_ids() {
    const N: usize = 24;
    let (fs, backend) = adapter();

    let tasks: Vec<_> = (0..N)
        .map(|_| {
            let fs = fs.clone();
            tokio::spawn(async move { fs.write(Path::new("/conversations"), 0, b"").await })
        })
        .collect();
    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }

    let ids = conversation_ids(&fs).await;
    assert_eq!(ids.len(), N);
    let mut unique = ids.clone();
    unique.dedup();
    assert_eq!(unique.len(), N);
    assert_eq!(backend.conversation_count(), N);
}

// ============================================================================
// Tier 2: inode-level
// ============================================================================

#[tokio::test]
async fn fuse_walk_create_append_read() {
    let (fs, backend) = adapter();
    let ops = FuseOps::new(fs).owned_by(501, 20);

    let conv = ops
        .lookup(ROOT_INODE, OsStr::new("conversations"))
        .await
        .unwrap();
    ops.write(conv.ino, 0, b"").await.unwrap();

    let rows = ops.readdir(conv.ino).await.unwrap();
    let (_, _, id) = rows
        .iter()
        .find(|(_, _, name)| name != "." && name != "..")
        .cloned()
        .unwrap();

    let file = ops.lookup(conv.ino, OsStr::new(&id)).await.unwrap();
    assert_eq!(file.kind, fuser::FileType::RegularFile);
    assert_eq!(file.perm, 0o644);
    assert_eq!(file.size, 0);

    ops.write(file.ino, 0, b"what is rust?").await.unwrap();
    backend
        .push_message(&id, Message::assistant("a language"))
        .unwrap();

    let data = ops.read(file.ino, 0, 4096).await.unwrap();
    assert_eq!(data, b"user: what is rust?\nassistant: a language");
}

#[tokio::test]
async fn fuse_errnos() {
    let (fs, backend) = adapter();
    let ops = FuseOps::new(fs);

    // Reserved stubs are listed but do not resolve.
    assert_eq!(
        ops.lookup(ROOT_INODE, OsStr::new("status.txt")).await.unwrap_err(),
        libc::ENOENT
    );
    assert_eq!(
        ops.lookup(ROOT_INODE, OsStr::new("missing")).await.unwrap_err(),
        libc::ENOENT
    );

    let conv = ops
        .lookup(ROOT_INODE, OsStr::new("conversations"))
        .await
        .unwrap();
    ops.write(conv.ino, 0, b"").await.unwrap();
    let rows = ops.readdir(conv.ino).await.unwrap();
    let file_ino = rows[2].0;
    assert_eq!(ops.readdir(file_ino).await.unwrap_err(), libc::ENOTDIR);

    backend.set_failing(true);
    assert_eq!(ops.write(conv.ino, 0, b"").await.unwrap_err(), libc::EIO);
}

// ============================================================================
// Tier 3: lifecycle
// ============================================================================

struct StubTransport;

impl MountTransport for StubTransport {
    type Session = ();

    fn mount(&self, _mountpoint: &Path) -> Result<(), MountError> {
        Ok(())
    }
}

#[tokio::test]
async fn deactivate_twice_is_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let manager = MountManager::new(StubTransport);

    manager.activate(dir.path()).await.unwrap();
    assert!(manager.deactivate(dir.path()));
    assert!(!manager.deactivate(dir.path()));
    assert!(!manager.deactivate(&dir.path().join("never-mounted")));
}
