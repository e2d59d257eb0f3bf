//! FUSE bridge over [`VfsOps`].
//!
//! `fuser` drives a single session thread and expects every callback to
//! return quickly, while the conversation backend is async and may block
//! on the network. [`ConvoFuse`] therefore hands each request to a tokio
//! task and replies from there. The actual logic lives on [`FuseOps`],
//! which is plain async and can be exercised without a mount.

use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use convofs_kernel::{FileAttr, FileType, FsError, StatFs, VfsOps};
use fuser::{
    Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry, ReplyOpen, ReplyStatfs,
    ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use tokio::runtime::Handle;

use crate::constants::{ATTR_TTL, BLOCK_SIZE};
use crate::inode::InodeTable;

/// One `readdir` row: inode, kind, name.
pub type DirRow = (u64, fuser::FileType, String);

/// Inode-level operations backed by a path-based [`VfsOps`].
#[derive(Clone)]
pub struct FuseOps {
    vfs: Arc<dyn VfsOps>,
    inodes: Arc<InodeTable>,
    uid: u32,
    gid: u32,
}

impl FuseOps {
    /// Bridge `vfs`. Entries are reported as owned by root until
    /// [`FuseOps::owned_by`] says otherwise.
    pub fn new(vfs: Arc<dyn VfsOps>) -> Self {
        Self {
            vfs,
            inodes: Arc::new(InodeTable::new()),
            uid: 0,
            gid: 0,
        }
    }

    /// Report every entry as owned by `uid:gid`.
    pub fn owned_by(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    /// Owner reported in attributes.
    pub fn owner(&self) -> (u32, u32) {
        (self.uid, self.gid)
    }

    /// The inode table.
    pub fn inodes(&self) -> &Arc<InodeTable> {
        &self.inodes
    }

    fn path(&self, ino: u64) -> Result<PathBuf, c_int> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    /// Resolve `name` under `parent` and return its attributes.
    pub async fn lookup(&self, parent: u64, name: &OsStr) -> Result<fuser::FileAttr, c_int> {
        let path = self
            .inodes
            .child_path(parent, name)
            .ok_or(libc::ENOENT)?;
        let attr = self.vfs.getattr(&path).await.map_err(errno)?;
        let ino = self.inodes.inode(&path);
        Ok(self.to_fuse_attr(ino, &attr))
    }

    /// Attributes for a known inode.
    pub async fn getattr(&self, ino: u64) -> Result<fuser::FileAttr, c_int> {
        let path = self.path(ino)?;
        let attr = self.vfs.getattr(&path).await.map_err(errno)?;
        Ok(self.to_fuse_attr(ino, &attr))
    }

    /// Read a byte range.
    pub async fn read(&self, ino: u64, offset: i64, size: u32) -> Result<Vec<u8>, c_int> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let path = self.path(ino)?;
        self.vfs.read(&path, offset, size).await.map_err(errno)
    }

    /// Write a payload; returns bytes accepted.
    pub async fn write(&self, ino: u64, offset: i64, data: &[u8]) -> Result<u32, c_int> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let path = self.path(ino)?;
        self.vfs.write(&path, offset, data).await.map_err(errno)
    }

    /// Full listing including `.` and `..`.
    pub async fn readdir(&self, ino: u64) -> Result<Vec<DirRow>, c_int> {
        let path = self.path(ino)?;
        let entries = self.vfs.readdir(&path).await.map_err(errno)?;

        let mut rows = Vec::with_capacity(entries.len() + 2);
        rows.push((ino, fuser::FileType::Directory, ".".to_string()));
        rows.push((self.inodes.parent(ino), fuser::FileType::Directory, "..".to_string()));
        for entry in entries {
            let child = self.inodes.inode(&path.join(&entry.name));
            rows.push((child, to_fuse_kind(entry.kind), entry.name));
        }
        Ok(rows)
    }

    /// Filesystem statistics.
    pub async fn statfs(&self) -> Result<StatFs, c_int> {
        self.vfs.statfs().await.map_err(errno)
    }

    /// Convert core attributes into the FUSE struct.
    pub fn to_fuse_attr(&self, ino: u64, attr: &FileAttr) -> fuser::FileAttr {
        let mtime = attr.mtime.max(UNIX_EPOCH);
        fuser::FileAttr {
            ino,
            size: attr.size,
            blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
            atime: SystemTime::now(),
            mtime,
            ctime: mtime,
            crtime: mtime,
            kind: to_fuse_kind(attr.kind),
            perm: attr.perm as u16,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

fn to_fuse_kind(kind: FileType) -> fuser::FileType {
    match kind {
        FileType::File => fuser::FileType::RegularFile,
        FileType::Directory => fuser::FileType::Directory,
    }
}

fn errno(err: FsError) -> c_int {
    if matches!(err, FsError::BackendUnavailable(_)) {
        tracing::warn!("backend error: {err}");
    }
    err.errno()
}

/// Directory-offset slice of `rows` the kernel still needs.
pub fn rows_from(rows: Vec<DirRow>, offset: i64) -> impl Iterator<Item = (i64, DirRow)> {
    let start = usize::try_from(offset).unwrap_or(0);
    rows.into_iter()
        .enumerate()
        .skip(start)
        .map(|(idx, row)| ((idx + 1) as i64, row))
}

/// `fuser::Filesystem` implementation.
pub struct ConvoFuse {
    ops: FuseOps,
    runtime: Handle,
}

impl ConvoFuse {
    /// Serve `ops`, running each request on `runtime`.
    pub fn new(ops: FuseOps, runtime: Handle) -> Self {
        Self { ops, runtime }
    }
}

impl Filesystem for ConvoFuse {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let ops = self.ops.clone();
        let name: OsString = name.to_os_string();
        self.runtime.spawn(async move {
            match ops.lookup(parent, &name).await {
                Ok(attr) => reply.entry(&ATTR_TTL, &attr, 0),
                Err(e) => reply.error(e),
            }
        });
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.getattr(ino).await {
                Ok(attr) => reply.attr(&ATTR_TTL, &attr),
                Err(e) => reply.error(e),
            }
        });
    }

    // Truncation is accepted and ignored so `echo text > file` works; content
    // is append-only on the service side.
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        _size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.getattr(ino).await {
                Ok(attr) => reply.attr(&ATTR_TTL, &attr),
                Err(e) => reply.error(e),
            }
        });
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        // Sizes are reported as 0, so the page cache must be bypassed.
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.getattr(ino).await {
                Ok(_) => reply.opened(0, fuser::consts::FOPEN_DIRECT_IO),
                Err(e) => reply.error(e),
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.read(ino, offset, size).await {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e),
            }
        });
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let ops = self.ops.clone();
        let data = data.to_vec();
        self.runtime.spawn(async move {
            match ops.write(ino, offset, &data).await {
                Ok(written) => reply.written(written),
                Err(e) => reply.error(e),
            }
        });
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.readdir(ino).await {
                Ok(rows) => {
                    for (next, (child, kind, name)) in rows_from(rows, offset) {
                        if reply.add(child, next, kind, name) {
                            break;
                        }
                    }
                    reply.ok();
                }
                Err(e) => reply.error(e),
            }
        });
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let ops = self.ops.clone();
        self.runtime.spawn(async move {
            match ops.statfs().await {
                Ok(s) => reply.statfs(
                    s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
                ),
                Err(e) => reply.error(e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ROOT_INODE;
    use convofs_kernel::{ConversationConfig, ConversationFs, MemoryConversations};

    fn setup() -> (FuseOps, Arc<MemoryConversations>) {
        let backend = Arc::new(MemoryConversations::new());
        let fs = ConversationFs::new(backend.clone(), ConversationConfig::default());
        (FuseOps::new(Arc::new(fs)).owned_by(1000, 1000), backend)
    }

    #[tokio::test]
    async fn test_root_attr() {
        let (ops, _) = setup();
        let attr = ops.getattr(ROOT_INODE).await.unwrap();
        assert_eq!(attr.kind, fuser::FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.size, 4096);
        assert_eq!(attr.uid, 1000);
    }

    #[test]
    fn test_owner_defaults_to_root() {
        let fs = ConversationFs::new(
            Arc::new(MemoryConversations::new()),
            ConversationConfig::default(),
        );
        let ops = FuseOps::new(Arc::new(fs));
        assert_eq!(ops.owner(), (0, 0));
        assert_eq!(ops.owned_by(501, 20).owner(), (501, 20));
    }

    #[tokio::test]
    async fn test_lookup_allocates_inode() {
        let (ops, _) = setup();
        let attr = ops.lookup(ROOT_INODE, OsStr::new("conversations")).await.unwrap();
        assert_ne!(attr.ino, ROOT_INODE);
        assert_eq!(attr.kind, fuser::FileType::Directory);
        assert_eq!(
            ops.inodes().path(attr.ino),
            Some(std::path::PathBuf::from("/conversations"))
        );

        let again = ops.lookup(ROOT_INODE, OsStr::new("conversations")).await.unwrap();
        assert_eq!(again.ino, attr.ino);
    }

    #[tokio::test]
    async fn test_lookup_unknown_is_enoent() {
        let (ops, _) = setup();
        let conv = ops.lookup(ROOT_INODE, OsStr::new("conversations")).await.unwrap();
        assert_eq!(
            ops.lookup(conv.ino, OsStr::new("nope")).await.unwrap_err(),
            libc::ENOENT
        );
        assert_eq!(ops.getattr(9999).await.unwrap_err(), libc::ENOENT);
    }

    #[tokio::test]
    async fn test_readdir_rows() {
        let (ops, _) = setup();
        let rows = ops.readdir(ROOT_INODE).await.unwrap();
        let names: Vec<&str> = rows.iter().map(|(_, _, n)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![".", "..", "conversations", "completions", "config", "status.txt"]
        );
        assert_eq!(rows[0].0, ROOT_INODE);
        assert_eq!(rows[1].0, ROOT_INODE);
        assert_eq!(rows[5].1, fuser::FileType::RegularFile);
    }

    #[tokio::test]
    async fn test_readdir_offsets() {
        let (ops, _) = setup();
        let rows = ops.readdir(ROOT_INODE).await.unwrap();
        let rest: Vec<_> = rows_from(rows, 4).collect();
        assert_eq!(rest.len(), 2);
        let (next, (_, _, name)) = &rest[0];
        assert_eq!(*next, 5);
        assert_eq!(name, "config");
    }

    #[tokio::test]
    async fn test_write_then_read_through_inodes() {
        let (ops, backend) = setup();
        let conv = ops.lookup(ROOT_INODE, OsStr::new("conversations")).await.unwrap();
        ops.write(conv.ino, 0, b"").await.unwrap();

        let rows = ops.readdir(conv.ino).await.unwrap();
        assert_eq!(rows.len(), 3);
        let (file_ino, kind, id) = rows[2].clone();
        assert_eq!(kind, fuser::FileType::RegularFile);

        assert_eq!(ops.write(file_ino, 0, b"hello").await.unwrap(), 5);
        backend
            .push_message(&id, convofs_kernel::Message::assistant("hi!"))
            .unwrap();

        let data = ops.read(file_ino, 0, 4096).await.unwrap();
        assert_eq!(data, b"user: hello\nassistant: hi!");
        assert_eq!(ops.read(file_ino, 6, 5).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_negative_offset_rejected() {
        let (ops, _) = setup();
        assert_eq!(ops.read(ROOT_INODE, -1, 10).await.unwrap_err(), libc::EINVAL);
    }

    #[tokio::test]
    async fn test_backend_failure_is_eio() {
        let (ops, backend) = setup();
        let conv = ops.lookup(ROOT_INODE, OsStr::new("conversations")).await.unwrap();
        backend.set_failing(true);
        assert_eq!(ops.write(conv.ino, 0, b"").await.unwrap_err(), libc::EIO);
    }
}
