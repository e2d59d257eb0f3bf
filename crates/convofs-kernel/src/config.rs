//! Configuration for the backend, new conversations, and the mount.
//!
//! Loaded from TOML; every section and field is optional:
//!
//! ```toml
//! [backend]
//! kind = "http"                        # or "memory"
//! base_url = "https://api.anthropic.com"
//! api_key_env = "ANTHROPIC_API_KEY"    # or api_key = "..."
//!
//! [conversation]
//! model = "claude-3-5-sonnet-latest"
//! max_tokens = 8192
//!
//! [mount]
//! fs_name = "convofs"
//! auto_unmount = true
//! allow_other = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{
    ConversationBackend, ConversationConfig, HttpBackend, MemoryConversations, DEFAULT_BASE_URL,
};

/// Standard environment variable for the service API key.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

/// Errors loading configuration or building a backend from it.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`Config`].
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The http backend needs an API key and none was found.
    #[error("no API key: set `api_key`, `api_key_env`, or ANTHROPIC_API_KEY")]
    MissingApiKey,

    /// Backend client could not be constructed.
    #[error("backend setup failed: {0}")]
    Backend(#[from] crate::backend::BackendError),
}

/// Which conversation backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Remote service over HTTP.
    #[default]
    Http,
    /// In-process, ephemeral.
    Memory,
}

/// Backend connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend kind.
    pub kind: BackendKind,

    /// API key (inline).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable name for the API key (alternative to inline key).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl BackendConfig {
    /// Resolve API key from config or environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        // Direct key takes precedence
        if let Some(key) = &self.api_key {
            return Some(key.clone());
        }

        if let Some(env_var) = &self.api_key_env {
            return std::env::var(env_var).ok();
        }

        std::env::var(API_KEY_ENV).ok()
    }

    /// Effective base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Build the configured backend.
    pub fn build(&self) -> Result<Arc<dyn ConversationBackend>, ConfigError> {
        match self.kind {
            BackendKind::Memory => Ok(Arc::new(MemoryConversations::new())),
            BackendKind::Http => {
                let key = self.resolve_api_key().ok_or(ConfigError::MissingApiKey)?;
                Ok(Arc::new(HttpBackend::new(self.base_url(), key)?))
            }
        }
    }
}

/// Mount options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Filesystem name shown in the mount table.
    pub fs_name: String,
    /// Ask the FUSE driver to unmount when the process exits.
    pub auto_unmount: bool,
    /// Let other users access the mount.
    pub allow_other: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            fs_name: "convofs".to_string(),
            auto_unmount: true,
            allow_other: false,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backend: BackendConfig,
    pub conversation: ConversationConfig,
    pub mount: MountConfig,
}

impl Config {
    /// Default config file location (`$XDG_CONFIG_HOME/convofs/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("convofs").join("config.toml"))
    }

    /// Parse a TOML document.
    pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Load from a file. `~` is expanded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = expand_path(path.as_ref());
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_toml(&text, &path)
    }

    /// Load `path` if given, else the default location if it exists, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(default) if default.exists() => Self::load(default),
            _ => Ok(Self::default()),
        }
    }
}

/// Expand `~` and environment variables in a path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.backend.kind, BackendKind::Http);
        assert_eq!(config.backend.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.conversation.model, "claude-3-5-sonnet-latest");
        assert_eq!(config.conversation.max_tokens, 8192);
        assert_eq!(config.mount.fs_name, "convofs");
        assert!(config.mount.auto_unmount);
    }

    #[test]
    fn test_partial_toml() {
        let config = Config::from_toml(
            r#"
            [backend]
            kind = "memory"

            [conversation]
            model = "claude-haiku"
            "#,
            Path::new("inline"),
        )
        .unwrap();
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.conversation.model, "claude-haiku");
        assert_eq!(config.conversation.max_tokens, 8192);
        assert!(!config.mount.allow_other);
    }

    #[test]
    fn test_bad_toml() {
        let err = Config::from_toml("[backend]\nkind = \"carrier-pigeon\"", Path::new("x.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[backend]\nbase_url = \"http://localhost:9999\"\napi_key = \"k\""
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.backend.base_url(), "http://localhost:9999");
        assert_eq!(config.backend.resolve_api_key().as_deref(), Some("k"));
        assert!(config.backend.build().is_ok());
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_api_key_env_indirection() {
        let backend = BackendConfig {
            api_key_env: Some("CONVOFS_TEST_KEY_THAT_IS_UNSET".into()),
            ..Default::default()
        };
        assert_eq!(backend.resolve_api_key(), None);
        assert!(matches!(backend.build(), Err(ConfigError::MissingApiKey)));
    }

    #[test]
    fn test_memory_backend_needs_no_key() {
        let backend = BackendConfig {
            kind: BackendKind::Memory,
            api_key_env: Some("CONVOFS_TEST_KEY_THAT_IS_UNSET".into()),
            ..Default::default()
        };
        assert_eq!(backend.build().unwrap().name(), "memory");
    }
}
