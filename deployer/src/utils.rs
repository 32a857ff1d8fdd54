//! Utility functions

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::errors::DeployError;

/// Version information for the deployer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Bound an operation by `limit`, turning expiry into a `TimeoutError`
pub async fn with_timeout<T, F>(operation: &str, limit: Duration, fut: F) -> Result<T, DeployError>
where
    F: Future<Output = Result<T, DeployError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeployError::TimeoutError(format!(
            "{} did not finish within {}s",
            operation,
            limit.as_secs_f64()
        ))),
    }
}
