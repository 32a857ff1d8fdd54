//! Per-server SSH key pairs

pub mod generator;
pub mod store;

use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::errors::DeployError;

/// Private key file name inside a server's key directory
pub const PRIVATE_KEY_FILE: &str = "id_rsa";

/// Public key file name, only present while provisioning
pub const PUBLIC_KEY_FILE: &str = "id_rsa.pub";

/// OpenSSH public key line (`<type> <base64 blob> [comment]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PublicKey(String);

impl PublicKey {
    /// Parse an `authorized_keys`-style line
    pub fn parse(raw: &str) -> Result<Self, DeployError> {
        let line = raw.trim();
        let mut parts = line.split_whitespace();
        let (Some(key_type), Some(blob)) = (parts.next(), parts.next()) else {
            return Err(DeployError::KeyGenerationError(
                "Public key is not in OpenSSH format".to_string(),
            ));
        };
        if !key_type.starts_with("ssh-") && !key_type.starts_with("ecdsa-") {
            return Err(DeployError::KeyGenerationError(format!(
                "Unsupported public key type: {}",
                key_type
            )));
        }
        BASE64.decode(blob).map_err(|e| {
            DeployError::KeyGenerationError(format!("Invalid public key encoding: {e}"))
        })?;
        Ok(Self(line.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key type, e.g. `ssh-rsa`
    pub fn key_type(&self) -> &str {
        self.0.split_whitespace().next().unwrap_or_default()
    }

    /// `SHA256:<base64>` fingerprint as printed by `ssh-keygen -l`
    pub fn fingerprint(&self) -> String {
        let blob = self
            .0
            .split_whitespace()
            .nth(1)
            .and_then(|b| BASE64.decode(b).ok())
            .unwrap_or_default();
        let digest = Sha256::digest(&blob);
        format!("SHA256:{}", BASE64_NO_PAD.encode(digest))
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
