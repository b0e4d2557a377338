//! Domain model for project leases.
//!
//! Projects carry a single daemon lock; jobs carry the pipeline work and the
//! daemon that owns it. Claim rules live here so every store applies the same
//! eligibility check inside its own atomic section.

mod claim;
mod error;
mod ids;
mod job;
mod project;
mod stage;
mod sweep;

pub use claim::{ClaimOutcome, ClaimRejection, ClaimedJob, ForcedRelease, evaluate_claim};
pub use error::{LeaseDomainError, ParseJobStatusError, ParseJobTypeError, ParseProjectStageError};
pub use ids::{DaemonId, JobId, ProjectId};
pub use job::{Job, JobStatus, PersistedJobData, ReportPlan};
pub use project::{PersistedProjectData, Project, ProjectLock};
pub use stage::{JobType, ProjectStage};
pub use sweep::SweepRequest;
