//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::layout::StorageLayout;
use crate::storage::settings::{KeySettings, ReleaseSettings, Settings, SshSettings, Transport};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Storage layout paths
    pub layout: StorageLayout,

    /// Root of the per-server key directories
    pub key_root: PathBuf,

    /// Key generation settings
    pub keys: KeySettings,

    /// Release pipeline settings
    pub releases: ReleaseSettings,

    /// How servers are reached
    pub transport: Transport,

    /// SSH client settings
    pub ssh: SshSettings,

    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,
}

impl AppOptions {
    /// Options for the given layout and settings file contents
    pub fn from_settings(layout: StorageLayout, settings: &Settings) -> Self {
        let key_root = settings
            .key_root
            .clone()
            .unwrap_or_else(|| layout.keys_dir().path().to_path_buf());

        Self {
            layout,
            key_root,
            keys: settings.keys.clone(),
            releases: settings.releases.clone(),
            transport: settings.transport,
            ssh: settings.ssh.clone(),
            lifecycle: LifecycleOptions {
                max_shutdown_delay: settings.tasks.drain_timeout(),
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(StorageLayout::default(), &Settings::default())
    }
}

/// Lifecycle options for the deployer
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum time the task worker gets to drain on shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
