//! SSH transport through the system `ssh` client

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::errors::DeployError;
use crate::models::server::Endpoint;
use crate::remote::RemoteShell;
use crate::storage::settings::SshSettings;

/// Runs each operation as one non-interactive `ssh` command
#[derive(Debug, Clone)]
pub struct SshShell {
    endpoint: Endpoint,
    identity: PathBuf,
    settings: SshSettings,
}

impl SshShell {
    pub fn new(endpoint: Endpoint, identity: PathBuf, settings: SshSettings) -> Self {
        Self {
            endpoint,
            identity,
            settings,
        }
    }

    /// Arguments passed to the ssh client before the remote command
    fn ssh_args(&self) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.identity.display().to_string(),
            "-p".to_string(),
            self.endpoint.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.settings.connect_timeout_secs),
            "-o".to_string(),
            format!(
                "StrictHostKeyChecking={}",
                self.settings.strict_host_key_checking
            ),
            "--".to_string(),
            format!("{}@{}", self.endpoint.connect_as, self.endpoint.address),
        ]
    }

    /// Run a remote command, returning its stdout
    async fn run(&self, command: &str) -> Result<String, DeployError> {
        debug!(
            "ssh {}@{}:{} $ {}",
            self.endpoint.connect_as, self.endpoint.address, self.endpoint.port, command
        );

        let output = Command::new(&self.settings.binary)
            .args(self.ssh_args())
            .arg(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DeployError::FilesystemError(format!(
                    "Failed to run {}: {}",
                    self.settings.binary, e
                ))
            })?;

        if !output.status.success() {
            return Err(DeployError::FilesystemError(format!(
                "Remote command on {} exited with {}: {}",
                self.endpoint.address,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Quote a string for a POSIX shell
pub fn shell_quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', r"'\''"))
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy())
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn create_dir_all(&self, path: &Path) -> Result<(), DeployError> {
        self.run(&format!("mkdir -p -- {}", quote_path(path)))
            .await
            .map(|_| ())
    }

    async fn is_dir(&self, path: &Path) -> Result<bool, DeployError> {
        let out = self
            .run(&format!(
                "if [ -d {} ]; then echo 1; else echo 0; fi",
                quote_path(path)
            ))
            .await?;
        Ok(out.trim() == "1")
    }

    async fn read_link(&self, path: &Path) -> Result<Option<PathBuf>, DeployError> {
        let out = self
            .run(&format!("readlink -- {} || true", quote_path(path)))
            .await?;
        let target = out.trim_end_matches('\n');
        if target.is_empty() {
            Ok(None)
        } else {
            Ok(Some(PathBuf::from(target)))
        }
    }

    async fn symlink(&self, target: &Path, link: &Path) -> Result<(), DeployError> {
        self.run(&format!(
            "ln -s -- {} {}",
            quote_path(target),
            quote_path(link)
        ))
        .await
        .map(|_| ())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<(), DeployError> {
        // -T: never move into the directory `to` points at
        self.run(&format!("mv -fT -- {} {}", quote_path(from), quote_path(to)))
            .await
            .map(|_| ())
    }

    async fn remove_file(&self, path: &Path) -> Result<(), DeployError> {
        self.run(&format!("rm -f -- {}", quote_path(path)))
            .await
            .map(|_| ())
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<(), DeployError> {
        self.run(&format!("rm -rf -- {}", quote_path(path)))
            .await
            .map(|_| ())
    }

    async fn list_dirs(&self, path: &Path) -> Result<Vec<String>, DeployError> {
        let quoted = quote_path(path);
        let out = self
            .run(&format!(
                "if [ -d {q} ]; then find {q} -mindepth 1 -maxdepth 1 -type d -printf '%f\\n'; fi",
                q = quoted
            ))
            .await?;
        let mut dirs: Vec<String> = out
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        dirs.sort();
        Ok(dirs)
    }

    async fn exec(&self, program: &str, args: &[String]) -> Result<(), DeployError> {
        let mut command = shell_quote(program);
        for arg in args {
            command.push(' ');
            command.push_str(&shell_quote(arg));
        }
        self.run(&command).await.map(|_| ())
    }
}
