//! Release records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::DeployError;

/// Timestamp format used for generated release IDs
const RELEASE_ID_FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Release identifier, ordered lexicographically in creation order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Use an explicit release name
    pub fn parse(raw: impl Into<String>) -> Result<Self, DeployError> {
        let raw = raw.into();
        let valid = !raw.is_empty()
            && raw != "."
            && raw != ".."
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(DeployError::ValidationError(format!(
                "Invalid release id: {:?}",
                raw
            )));
        }
        Ok(Self(raw))
    }

    /// Generate an ID from `now` that sorts after `latest`
    pub fn generate(now: DateTime<Utc>, latest: Option<&ReleaseId>) -> Self {
        let candidate = Self(now.format(RELEASE_ID_FORMAT).to_string());
        match latest {
            Some(latest) if candidate <= *latest => latest.successor(),
            _ => candidate,
        }
    }

    /// Smallest generated-style ID that sorts after this one
    fn successor(&self) -> Self {
        match self.0.parse::<u64>() {
            Ok(n) if self.0.len() == 17 => Self(format!("{:017}", n + 1)),
            _ => Self(format!("{}.1", self.0)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Release lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    /// Recorded, nothing on disk yet
    Pending,

    /// Release directory created and being populated
    Building,

    /// Shared folders linked into the release
    FoldersLinked,

    /// Target of the `current` symlink
    Active,

    /// Previously active, kept on disk for rollback
    Inactive,

    /// A pipeline step failed
    Failed,

    /// Deleted from disk by pruning
    Purged,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Pending => "pending",
            ReleaseStatus::Building => "building",
            ReleaseStatus::FoldersLinked => "folders_linked",
            ReleaseStatus::Active => "active",
            ReleaseStatus::Inactive => "inactive",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Purged => "purged",
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One versioned deployment output on one server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release ID, also the directory name under `releases/`
    pub id: ReleaseId,

    /// Current status
    pub status: ReleaseStatus,

    /// When the release was started (or discovered on disk)
    pub created_at: DateTime<Utc>,

    /// State the release was entering when it failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<ReleaseStatus>,

    /// Failure detail, kept for operators
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Release {
    /// A fresh release in `pending`
    pub fn pending(id: ReleaseId) -> Self {
        Self {
            id,
            status: ReleaseStatus::Pending,
            created_at: Utc::now(),
            failed_in: None,
            error: None,
        }
    }
}
