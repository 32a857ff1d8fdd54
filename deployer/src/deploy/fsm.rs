//! Finite state machine for a release on one server

use crate::models::release::{Release, ReleaseStatus};

/// Release event
#[derive(Debug, Clone)]
pub enum ReleaseEvent {
    /// Release directory created and populated
    Build,

    /// Every linked folder points at its shared directory
    LinkFolders,

    /// `current` now points at this release
    Activate,

    /// Another release took over `current`
    Supersede,

    /// Rolled back to: `current` points here again
    Reinstate,

    /// A pipeline step failed
    Fail(String),

    /// Release directory deleted
    Purge,
}

impl ReleaseStatus {
    /// The status a pipeline step moves a release into from here
    ///
    /// A failure is recorded against this status.
    pub fn next_step(&self) -> Option<ReleaseStatus> {
        match self {
            ReleaseStatus::Pending => Some(ReleaseStatus::Building),
            ReleaseStatus::Building => Some(ReleaseStatus::FoldersLinked),
            ReleaseStatus::FoldersLinked => Some(ReleaseStatus::Active),
            _ => None,
        }
    }
}

impl Release {
    /// Process an event and transition state
    pub fn process(&mut self, event: ReleaseEvent) -> Result<(), String> {
        let new_status = match (&self.status, &event) {
            // Pipeline
            (ReleaseStatus::Pending, ReleaseEvent::Build) => ReleaseStatus::Building,
            (ReleaseStatus::Building, ReleaseEvent::LinkFolders) => ReleaseStatus::FoldersLinked,
            (ReleaseStatus::FoldersLinked, ReleaseEvent::LinkFolders) => {
                ReleaseStatus::FoldersLinked
            }
            (ReleaseStatus::FoldersLinked, ReleaseEvent::Activate) => ReleaseStatus::Active,

            // Pipeline failure
            (
                status @ (ReleaseStatus::Pending
                | ReleaseStatus::Building
                | ReleaseStatus::FoldersLinked),
                ReleaseEvent::Fail(err),
            ) => {
                self.failed_in = status.next_step();
                self.error = Some(err.clone());
                ReleaseStatus::Failed
            }

            // History
            (ReleaseStatus::Active, ReleaseEvent::Supersede) => ReleaseStatus::Inactive,
            (ReleaseStatus::Inactive, ReleaseEvent::Reinstate) => ReleaseStatus::Active,
            (ReleaseStatus::Inactive | ReleaseStatus::Failed, ReleaseEvent::Purge) => {
                ReleaseStatus::Purged
            }

            // Invalid transitions
            (status, event) => {
                return Err(format!(
                    "Invalid transition: {:?} -> {:?}",
                    status, event
                ));
            }
        };

        self.status = new_status;
        Ok(())
    }
}
