//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;

/// Deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to daily files under the storage logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Root for per-server key directories; defaults to `<base_dir>/keys`
    #[serde(default)]
    pub key_root: Option<PathBuf>,

    /// Key generation settings
    #[serde(default)]
    pub keys: KeySettings,

    /// Release pipeline settings
    #[serde(default)]
    pub releases: ReleaseSettings,

    /// How servers are reached
    #[serde(default)]
    pub transport: Transport,

    /// SSH client settings
    #[serde(default)]
    pub ssh: SshSettings,

    /// Background task settings
    #[serde(default)]
    pub tasks: TaskSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            key_root: None,
            keys: KeySettings::default(),
            releases: ReleaseSettings::default(),
            transport: Transport::default(),
            ssh: SshSettings::default(),
            tasks: TaskSettings::default(),
        }
    }
}

/// Key generation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySettings {
    /// Comment embedded in every generated public key
    #[serde(default = "default_key_comment")]
    pub comment: String,

    /// RSA modulus size
    #[serde(default = "default_key_bits")]
    pub bits: u32,

    /// Timeout for a single key generation, in seconds
    #[serde(default = "default_key_timeout")]
    pub timeout_secs: u64,
}

fn default_key_comment() -> String {
    "deployer".to_string()
}

fn default_key_bits() -> u32 {
    4096
}

fn default_key_timeout() -> u64 {
    60
}

impl KeySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            comment: default_key_comment(),
            bits: default_key_bits(),
            timeout_secs: default_key_timeout(),
        }
    }
}

/// Release pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseSettings {
    /// Number of newest releases retained by pruning
    #[serde(default = "default_keep_releases")]
    pub keep: usize,

    /// Timeout for each remote operation, in seconds
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Timeout for populating a release from source, in seconds
    #[serde(default = "default_build_timeout")]
    pub build_timeout_secs: u64,
}

fn default_keep_releases() -> usize {
    5
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_build_timeout() -> u64 {
    600
}

impl ReleaseSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl Default for ReleaseSettings {
    fn default() -> Self {
        Self {
            keep: default_keep_releases(),
            operation_timeout_secs: default_operation_timeout(),
            build_timeout_secs: default_build_timeout(),
        }
    }
}

/// Remote transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// System `ssh` client with the server's private key
    #[default]
    Ssh,

    /// Operate on the local filesystem (single-host deployments)
    Local,
}

/// SSH client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Path or name of the ssh binary
    #[serde(default = "default_ssh_binary")]
    pub binary: String,

    /// Connection timeout passed to ssh, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Value for `StrictHostKeyChecking`
    #[serde(default = "default_strict_host_key_checking")]
    pub strict_host_key_checking: String,
}

fn default_ssh_binary() -> String {
    "ssh".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_strict_host_key_checking() -> String {
    "accept-new".to_string()
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            binary: default_ssh_binary(),
            connect_timeout_secs: default_connect_timeout(),
            strict_host_key_checking: default_strict_host_key_checking(),
        }
    }
}

/// Background task settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// Maximum time to wait for queued tasks on shutdown, in seconds
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_secs: u64,
}

fn default_drain_timeout() -> u64 {
    30
}

impl TaskSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout(),
        }
    }
}
