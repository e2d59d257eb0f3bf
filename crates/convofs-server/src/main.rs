//! convofs binary
//!
//! Mounts a conversation service as a filesystem.
//!
//! ## Usage
//!
//! ```bash
//! # Mount against the hosted API (key from ANTHROPIC_API_KEY)
//! convofs mount ~/convo
//!
//! # Ephemeral in-memory conversations, no network
//! convofs mount ~/convo --backend memory
//!
//! # Release a mount left behind by a crashed process
//! convofs unmount ~/convo
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use convofs_kernel::{BackendKind, Config, ConversationFs};
use convofs_server::mount::fusermount_unmount;
use convofs_server::{FuseOps, FuseTransport, MountManager};

#[derive(Parser, Debug)]
#[command(name = "convofs")]
#[command(about = "Browse and drive conversations through a mounted filesystem")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mount and serve until interrupted
    Mount {
        /// Directory to mount at (created if missing)
        mountpoint: PathBuf,

        /// Config file (default: $XDG_CONFIG_HOME/convofs/config.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Conversation backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,

        /// Conversation service base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Model for new conversations
        #[arg(long)]
        model: Option<String>,

        /// Token limit for new conversations
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// Release a mount point
    Unmount {
        mountpoint: PathBuf,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Http,
    Memory,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Http => BackendKind::Http,
            BackendArg::Memory => BackendKind::Memory,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr));

    #[cfg(feature = "telemetry")]
    let _otel_guard = if convofs_telemetry::otel_enabled() {
        let (otel_layer, guard) = convofs_telemetry::otel_layer("convofs")?;
        registry.with(otel_layer).init();
        Some(guard)
    } else {
        registry.init();
        None
    };
    #[cfg(not(feature = "telemetry"))]
    registry.init();

    match Args::parse().command {
        Command::Mount {
            mountpoint,
            config,
            backend,
            base_url,
            model,
            max_tokens,
        } => {
            let mut config = Config::load_or_default(config.as_deref())?;
            if let Some(kind) = backend {
                config.backend.kind = kind.into();
            }
            if base_url.is_some() {
                config.backend.base_url = base_url;
            }
            if let Some(model) = model {
                config.conversation.model = model;
            }
            if let Some(max_tokens) = max_tokens {
                config.conversation.max_tokens = max_tokens;
            }
            run_mount(mountpoint, config).await
        }
        Command::Unmount { mountpoint } => {
            let path = convofs_kernel::config::expand_path(&mountpoint);
            match fusermount_unmount(&path).await {
                Ok(()) => tracing::info!("unmounted {}", path.display()),
                Err(e) => tracing::warn!("{e}"),
            }
            Ok(())
        }
    }
}

async fn run_mount(mountpoint: PathBuf, config: Config) -> Result<()> {
    let backend = config.backend.build()?;
    tracing::info!(
        backend = backend.name(),
        model = %config.conversation.model,
        "starting convofs"
    );

    let fs = ConversationFs::new(backend, config.conversation.clone());
    let ops = FuseOps::new(Arc::new(fs));
    let transport = FuseTransport::new(ops, config.mount.clone(), tokio::runtime::Handle::current());
    let manager = MountManager::new(transport);

    let path = manager
        .activate(&mountpoint)
        .await
        .with_context(|| format!("mounting at {}", mountpoint.display()))?;

    tracing::info!("serving {} (ctrl-c to stop)", path.display());
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    manager.deactivate_all();
    Ok(())
}
