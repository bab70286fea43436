// Domain Error Types

use thiserror::Error;

use crate::domain::job::JobStatus;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid job status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Job is claimed by {claimed_by:?}, not {reporter}")]
    NotClaimant {
        reporter: String,
        claimed_by: Option<String>,
    },
}

pub type Result<T> = std::result::Result<T, DomainError>;
