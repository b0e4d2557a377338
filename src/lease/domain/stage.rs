//! Pipeline stages and the job types that perform them.

use super::{ParseJobTypeError, ParseProjectStageError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline stage a project is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStage {
    /// Project created, no pipeline work requested yet.
    Draft,
    /// Script generation.
    Scripting,
    /// Narration and audio synthesis.
    Voiceover,
    /// Still image and clip generation.
    Imagery,
    /// Final video composition and encoding.
    Rendering,
    /// All pipeline stages finished.
    Completed,
    /// Cancelled by the owner.
    Cancelled,
    /// Abandoned after an unrecoverable pipeline error.
    Failed,
}

impl ProjectStage {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scripting => "scripting",
            Self::Voiceover => "voiceover",
            Self::Imagery => "imagery",
            Self::Rendering => "rendering",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// Returns the job type this stage expects, if any.
    #[must_use]
    pub const fn expected_job_type(self) -> Option<JobType> {
        match self {
            Self::Scripting => Some(JobType::Script),
            Self::Voiceover => Some(JobType::Audio),
            Self::Imagery => Some(JobType::Image),
            Self::Rendering => Some(JobType::Video),
            Self::Draft | Self::Completed | Self::Cancelled | Self::Failed => None,
        }
    }

    /// Returns whether jobs of `job_type` may run while the project is in
    /// this stage.
    #[must_use]
    pub fn accepts(self, job_type: JobType) -> bool {
        self.expected_job_type() == Some(job_type)
    }

    /// Returns whether the stage is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for ProjectStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProjectStage {
    type Error = ParseProjectStageError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "draft" => Ok(Self::Draft),
            "scripting" => Ok(Self::Scripting),
            "voiceover" => Ok(Self::Voiceover),
            "imagery" => Ok(Self::Imagery),
            "rendering" => Ok(Self::Rendering),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "failed" => Ok(Self::Failed),
            _ => Err(ParseProjectStageError(value.to_owned())),
        }
    }
}

/// Kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Produces the video script.
    Script,
    /// Produces narration audio.
    Audio,
    /// Produces images and clips.
    Image,
    /// Composes and encodes the final video.
    Video,
}

impl JobType {
    /// All job types in pipeline order.
    pub const ALL: [Self; 4] = [Self::Script, Self::Audio, Self::Image, Self::Video];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Audio => "audio",
            Self::Image => "image",
            Self::Video => "video",
        }
    }

    /// Returns the project stage during which this job type runs.
    #[must_use]
    pub const fn stage(self) -> ProjectStage {
        match self {
            Self::Script => ProjectStage::Scripting,
            Self::Audio => ProjectStage::Voiceover,
            Self::Image => ProjectStage::Imagery,
            Self::Video => ProjectStage::Rendering,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for JobType {
    type Error = ParseJobTypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "script" => Ok(Self::Script),
            "audio" => Ok(Self::Audio),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            _ => Err(ParseJobTypeError(value.to_owned())),
        }
    }
}
