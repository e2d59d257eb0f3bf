//! Bidirectional inode ↔ path mapping.
//!
//! The core is path-based; FUSE speaks inodes. Inodes are handed out on
//! first sight of a path and never reused. Conversations are never deleted,
//! so entries are never evicted.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::constants::ROOT_INODE;

#[derive(Debug)]
struct Inner {
    paths: HashMap<u64, PathBuf>,
    inodes: HashMap<PathBuf, u64>,
    next: u64,
}

/// Thread-safe inode table. The root `/` is always [`ROOT_INODE`].
#[derive(Debug)]
pub struct InodeTable {
    inner: RwLock<Inner>,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    /// Create a table holding only the root.
    pub fn new() -> Self {
        let root = PathBuf::from("/");
        let mut paths = HashMap::new();
        let mut inodes = HashMap::new();
        paths.insert(ROOT_INODE, root.clone());
        inodes.insert(root, ROOT_INODE);
        Self {
            inner: RwLock::new(Inner {
                paths,
                inodes,
                next: ROOT_INODE + 1,
            }),
        }
    }

    /// Path for an inode.
    pub fn path(&self, ino: u64) -> Option<PathBuf> {
        self.inner.read().paths.get(&ino).cloned()
    }

    /// Inode for a path, allocating one if needed.
    pub fn inode(&self, path: &Path) -> u64 {
        if let Some(ino) = self.inner.read().inodes.get(path) {
            return *ino;
        }

        let mut inner = self.inner.write();
        // Another caller may have allocated between the two locks.
        if let Some(ino) = inner.inodes.get(path) {
            return *ino;
        }
        let ino = inner.next;
        inner.next += 1;
        inner.paths.insert(ino, path.to_path_buf());
        inner.inodes.insert(path.to_path_buf(), ino);
        ino
    }

    /// Path of `name` inside the directory `parent`.
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Option<PathBuf> {
        self.path(parent).map(|p| p.join(name))
    }

    /// Inode of the parent directory (the root is its own parent).
    pub fn parent(&self, ino: u64) -> u64 {
        match self.path(ino).as_deref().and_then(Path::parent) {
            Some(parent) => self.inode(parent),
            None => ROOT_INODE,
        }
    }

    /// Number of allocated inodes, root included.
    pub fn len(&self) -> usize {
        self.inner.read().paths.len()
    }

    /// Always false: the root is always present.
    pub fn is_empty(&self) -> bool {
        false
    }
}
