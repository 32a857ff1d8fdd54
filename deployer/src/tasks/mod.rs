//! Deferred background tasks
//!
//! The core only describes work (kind + identifiers) and hands it to a
//! [`TaskQueue`]. Whoever owns the queue decides where it runs.

pub mod housekeeper;
pub mod worker;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::errors::DeployError;
use crate::models::project::ProjectId;
use crate::models::server::ServerId;

/// A unit of deferred work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Delete a server's key directory
    RetireKeys { server_id: ServerId },

    /// Remove old release directories from a server
    PruneReleases {
        project_id: ProjectId,
        server_id: ServerId,
    },
}

/// Capability to enqueue background work
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: Task) -> Result<(), DeployError>;
}

/// In-process queue backed by an unbounded channel
#[derive(Clone)]
pub struct ChannelQueue {
    sender: mpsc::UnboundedSender<Task>,
}

impl ChannelQueue {
    /// Create a queue and the receiver a worker drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TaskQueue for ChannelQueue {
    fn enqueue(&self, task: Task) -> Result<(), DeployError> {
        debug!("Enqueueing task: {:?}", task);
        self.sender
            .send(task)
            .map_err(|e| DeployError::QueueError(format!("Task queue closed: {:?}", e.0)))
    }
}
