//! Release deployment
//!
//! [`release::ReleaseManager`] runs the per-server pipeline,
//! [`fleet::ServerFleet`] fans it out across a project's servers and
//! [`coordinator::DeploymentCoordinator`] is the entry point the
//! administrative layer calls.

pub mod coordinator;
pub mod fleet;
pub mod fsm;
pub mod ledger;
pub mod paths;
pub mod release;
pub mod report;

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::models::release::ReleaseId;

/// Where a release's contents come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Git repository URL, as reachable from the server
    pub repository: String,

    /// Branch or tag to check out
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

impl SourceSpec {
    /// `git` arguments for a shallow clone into `dir`
    pub fn clone_args(&self, dir: &Path) -> Vec<String> {
        vec![
            "clone".to_string(),
            "--depth".to_string(),
            "1".to_string(),
            "--branch".to_string(),
            self.branch.clone(),
            self.repository.clone(),
            dir.display().to_string(),
        ]
    }
}

/// Parameters of one deployment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseRequest {
    /// Explicit release ID; generated from the clock when absent
    #[serde(default)]
    pub release_id: Option<ReleaseId>,

    /// Source to populate the release from; the directory is left empty
    /// when absent
    #[serde(default)]
    pub source: Option<SourceSpec>,
}

/// Cooperative cancellation flag for running pipelines
#[derive(Debug, Clone)]
pub struct Cancellation {
    receiver: watch::Receiver<bool>,
}

impl Cancellation {
    /// A flag and the sender that raises it
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (sender, receiver) = watch::channel(false);
        (sender, Self { receiver })
    }

    /// A flag that is never raised
    pub fn never() -> Self {
        Self::channel().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }
}
