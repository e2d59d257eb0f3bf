//! Mount lifecycle: activate/deactivate mount points and announce changes.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use convofs_kernel::MountConfig;
use convofs_kernel::config::expand_path;
use fuser::{BackgroundSession, MountOption};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use crate::constants::FUSERMOUNT;
use crate::fuse::{ConvoFuse, FuseOps};

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 16;

/// Mount lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("failed to create mount point {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to mount {}: {source}", path.display())]
    Mount { path: PathBuf, source: io::Error },

    #[error("failed to unmount {}: {reason}", path.display())]
    Unmount { path: PathBuf, reason: String },
}

/// Lifecycle notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountEvent {
    Mounted(PathBuf),
    Unmounted(PathBuf),
}

/// Something that can attach a filesystem at a directory.
///
/// The returned session keeps the mount alive; dropping it unmounts.
/// `mount` may block and is always called off the async workers.
pub trait MountTransport: Send + Sync + 'static {
    type Session: Send + 'static;

    /// Clean up whatever a previous process may have left at `mountpoint`.
    fn prepare(&self, _mountpoint: &Path) -> impl Future<Output = ()> + Send {
        async {}
    }

    /// Attach at an existing directory.
    fn mount(&self, mountpoint: &Path) -> Result<Self::Session, MountError>;
}

/// Owner uid/gid of `dir`, reported for every entry in the mount.
pub fn mount_owner(dir: &Path) -> io::Result<(u32, u32)> {
    let meta = std::fs::metadata(dir)?;
    Ok((meta.uid(), meta.gid()))
}

/// Run `fusermount -u` on `mountpoint`.
pub async fn fusermount_unmount(mountpoint: &Path) -> Result<(), MountError> {
    let output = tokio::process::Command::new(FUSERMOUNT)
        .arg("-u")
        .arg(mountpoint)
        .output()
        .await
        .map_err(|e| MountError::Unmount {
            path: mountpoint.to_path_buf(),
            reason: e.to_string(),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(MountError::Unmount {
            path: mountpoint.to_path_buf(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Kernel FUSE transport.
pub struct FuseTransport {
    ops: FuseOps,
    config: MountConfig,
    runtime: Handle,
}

impl FuseTransport {
    /// Serve `ops`; FUSE requests are spawned onto `runtime`.
    pub fn new(ops: FuseOps, config: MountConfig, runtime: Handle) -> Self {
        Self { ops, config, runtime }
    }

    /// Mount options derived from config.
    pub fn options(&self) -> Vec<MountOption> {
        let mut options = vec![
            MountOption::FSName(self.config.fs_name.clone()),
            MountOption::DefaultPermissions,
        ];
        if self.config.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if self.config.allow_other {
            options.push(MountOption::AllowOther);
        }
        options
    }
}

impl MountTransport for FuseTransport {
    type Session = BackgroundSession;

    async fn prepare(&self, mountpoint: &Path) {
        // Usually nothing is mounted; failure is expected.
        if let Err(e) = fusermount_unmount(mountpoint).await {
            tracing::debug!("stale unmount skipped: {e}");
        }
    }

    fn mount(&self, mountpoint: &Path) -> Result<Self::Session, MountError> {
        let mount_err = |source| MountError::Mount {
            path: mountpoint.to_path_buf(),
            source,
        };
        let (uid, gid) = mount_owner(mountpoint).map_err(mount_err)?;
        let ops = self.ops.clone().owned_by(uid, gid);
        let fs = ConvoFuse::new(ops, self.runtime.clone());
        fuser::spawn_mount2(fs, mountpoint, &self.options()).map_err(mount_err)
    }
}

/// Tracks live mounts for one transport.
pub struct MountManager<T: MountTransport> {
    transport: Arc<T>,
    sessions: Mutex<HashMap<PathBuf, T::Session>>,
    /// Held across prepare, mkdir and mount so a second activation cannot
    /// tear down a mount the first one just made.
    activating: tokio::sync::Mutex<()>,
    events: broadcast::Sender<MountEvent>,
}

impl<T: MountTransport> MountManager<T> {
    pub fn new(transport: T) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport: Arc::new(transport),
            sessions: Mutex::new(HashMap::new()),
            activating: tokio::sync::Mutex::new(()),
            events,
        }
    }

    /// Mount at `mountpoint` (`~` is expanded). Returns the expanded path.
    ///
    /// Already-active mount points are left alone.
    #[tracing::instrument(name = "mount.activate", skip(self))]
    pub async fn activate(&self, mountpoint: &Path) -> Result<PathBuf, MountError> {
        let path = expand_path(mountpoint);
        let _guard = self.activating.lock().await;
        if self.is_active(&path) {
            tracing::debug!("already mounted at {}", path.display());
            return Ok(path);
        }

        self.transport.prepare(&path).await;

        let dir = path.clone();
        tokio::task::spawn_blocking(move || std::fs::create_dir_all(&dir))
            .await
            .unwrap_or_else(|e| Err(io::Error::other(e)))
            .map_err(|source| MountError::CreateDir {
                path: path.clone(),
                source,
            })?;

        let transport = self.transport.clone();
        let target = path.clone();
        let session = tokio::task::spawn_blocking(move || transport.mount(&target))
            .await
            .map_err(|e| MountError::Mount {
                path: path.clone(),
                source: io::Error::other(e),
            })??;
        self.sessions.lock().insert(path.clone(), session);

        tracing::info!("mounted at {}", path.display());
        // No subscribers is fine.
        let _ = self.events.send(MountEvent::Mounted(path.clone()));
        Ok(path)
    }

    /// Unmount `mountpoint`. Returns false if it was not mounted.
    #[tracing::instrument(name = "mount.deactivate", skip(self))]
    pub fn deactivate(&self, mountpoint: &Path) -> bool {
        let path = expand_path(mountpoint);
        let session = self.sessions.lock().remove(&path);
        let Some(session) = session else {
            return false;
        };
        drop(session);

        tracing::info!("unmounted {}", path.display());
        let _ = self.events.send(MountEvent::Unmounted(path));
        true
    }

    /// Unmount everything.
    pub fn deactivate_all(&self) {
        for path in self.active() {
            self.deactivate(&path);
        }
    }

    pub fn is_active(&self, mountpoint: &Path) -> bool {
        self.sessions.lock().contains_key(mountpoint)
    }

    /// Active mount points, sorted.
    pub fn active(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.sessions.lock().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Receive future [`MountEvent`]s.
    pub fn subscribe(&self) -> broadcast::Receiver<MountEvent> {
        self.events.subscribe()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
