//! Key pair generation

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;
use crate::storage::settings::KeySettings;

/// Produces `<dir>/<name>` (private) and `<dir>/<name>.pub` (public)
#[async_trait]
pub trait KeyGenerator: Send + Sync {
    async fn generate(&self, dir: &Path, name: &str, comment: &str) -> Result<(), DeployError>;
}

/// Key generation through the system `ssh-keygen`
#[derive(Debug, Clone)]
pub struct SshKeygen {
    /// Path or name of the ssh-keygen binary
    pub binary: String,

    /// RSA modulus size
    pub bits: u32,

    /// Upper bound for a single invocation
    pub timeout: Duration,
}

impl Default for SshKeygen {
    fn default() -> Self {
        Self {
            binary: "ssh-keygen".to_string(),
            bits: 4096,
            timeout: Duration::from_secs(60),
        }
    }
}

impl SshKeygen {
    pub fn from_settings(settings: &KeySettings) -> Self {
        Self {
            bits: settings.bits,
            timeout: settings.timeout(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl KeyGenerator for SshKeygen {
    async fn generate(&self, dir: &Path, name: &str, comment: &str) -> Result<(), DeployError> {
        let key_path = dir.join(name);
        debug!("Generating {}-bit RSA key pair at {}", self.bits, key_path.display());

        let output = Command::new(&self.binary)
            .arg("-q")
            .args(["-t", "rsa"])
            .args(["-b", &self.bits.to_string()])
            .args(["-N", ""])
            .args(["-C", comment])
            .arg("-f")
            .arg(&key_path)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                DeployError::KeyGenerationError(format!(
                    "{} did not finish within {:?}",
                    self.binary, self.timeout
                ))
            })?
            .map_err(|e| {
                DeployError::KeyGenerationError(format!("Failed to run {}: {}", self.binary, e))
            })?;

        if !output.status.success() {
            return Err(DeployError::KeyGenerationError(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}
