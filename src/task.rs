//! Long-running server-side jobs and their status vocabularies.

use crate::artifact::GeneratedArtifact;
use crate::errors::MirakoError;

/// Kind of asynchronous job the service can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    AvatarBuild,
    AvatarGenerate,
    ImageGenerate,
    VideoGenerate,
    VoiceClone,
}

/// Normalized job state. Every endpoint maps its own wire labels onto these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Processing,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

impl TaskState {
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            TaskState::Failed | TaskState::Canceled | TaskState::TimedOut
        )
    }
}

impl TaskKind {
    /// Human name used in progress and error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TaskKind::AvatarBuild => "avatar build",
            TaskKind::AvatarGenerate => "avatar generation",
            TaskKind::ImageGenerate => "image generation",
            TaskKind::VideoGenerate => "talking avatar video generation",
            TaskKind::VoiceClone => "voice cloning",
        }
    }

    /// Status shown by the spinner before the first poll returns.
    pub fn initial_label(self) -> &'static str {
        match self {
            TaskKind::AvatarBuild | TaskKind::VoiceClone => "PENDING",
            TaskKind::AvatarGenerate | TaskKind::ImageGenerate | TaskKind::VideoGenerate => {
                "PROCESSING"
            }
        }
    }

    /// Maps a wire status label onto a [`TaskState`].
    ///
    /// Matching is exact and case-sensitive. Each endpoint keeps its own
    /// spelling: generation endpoints say `CANCELED`/`TIMEDOUT`, the voice
    /// clone endpoint says `CANCELLED`/`TIMED_OUT`, avatar builds finish
    /// with `READY` or `ERROR`. Unknown labels are treated as in progress.
    pub fn classify(self, label: &str) -> TaskState {
        match self {
            TaskKind::AvatarGenerate | TaskKind::ImageGenerate | TaskKind::VideoGenerate => {
                match label {
                    "COMPLETED" => TaskState::Completed,
                    "FAILED" => TaskState::Failed,
                    "CANCELED" => TaskState::Canceled,
                    "TIMEDOUT" => TaskState::TimedOut,
                    "PENDING" | "IN_QUEUE" => TaskState::Pending,
                    _ => TaskState::Processing,
                }
            }
            TaskKind::AvatarBuild => match label {
                "READY" => TaskState::Completed,
                "ERROR" => TaskState::Failed,
                "PENDING" => TaskState::Pending,
                _ => TaskState::Processing,
            },
            TaskKind::VoiceClone => match label {
                "COMPLETED" => TaskState::Completed,
                "FAILED" => TaskState::Failed,
                "CANCELLED" => TaskState::Canceled,
                "TIMED_OUT" => TaskState::TimedOut,
                "PENDING" => TaskState::Pending,
                _ => TaskState::Processing,
            },
        }
    }
}

/// Identifier of a started job, held for the duration of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle {
    pub id: String,
    pub kind: TaskKind,
}

impl TaskHandle {
    pub fn new(id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// One immutable status snapshot.
#[derive(Debug, Clone)]
pub struct TaskStatus {
    label: String,
    state: TaskState,
    payload: Option<GeneratedArtifact>,
    error_detail: Option<String>,
}

impl TaskStatus {
    /// Builds a snapshot from what the status endpoint returned.
    ///
    /// A payload is only kept for a completed job and an error detail only
    /// for a failed one. A completed job without a payload is rejected.
    pub fn observe(
        kind: TaskKind,
        label: impl Into<String>,
        payload: Option<GeneratedArtifact>,
        error_detail: Option<String>,
    ) -> Result<Self, MirakoError> {
        let label = label.into();
        let state = kind.classify(&label);

        if state == TaskState::Completed && payload.is_none() {
            return Err(MirakoError::UnexpectedResponse(format!(
                "{} reported {} without a result",
                kind.describe(),
                label
            )));
        }

        Ok(Self {
            payload: payload.filter(|_| state == TaskState::Completed),
            error_detail: error_detail
                .filter(|d| state.is_failure() && !d.trim().is_empty()),
            label,
            state,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn payload(&self) -> Option<&GeneratedArtifact> {
        self.payload.as_ref()
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn into_payload(self) -> Option<GeneratedArtifact> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_vocabulary() {
        let kind = TaskKind::ImageGenerate;
        assert_eq!(kind.classify("COMPLETED"), TaskState::Completed);
        assert_eq!(kind.classify("FAILED"), TaskState::Failed);
        assert_eq!(kind.classify("CANCELED"), TaskState::Canceled);
        assert_eq!(kind.classify("TIMEDOUT"), TaskState::TimedOut);
        assert_eq!(kind.classify("IN_QUEUE"), TaskState::Pending);
        assert_eq!(kind.classify("IN_PROGRESS"), TaskState::Processing);
        // other endpoints' spellings are not terminal here
        assert_eq!(kind.classify("CANCELLED"), TaskState::Processing);
        assert_eq!(kind.classify("completed"), TaskState::Processing);
    }

    #[test]
    fn voice_clone_vocabulary() {
        let kind = TaskKind::VoiceClone;
        assert_eq!(kind.classify("CANCELLED"), TaskState::Canceled);
        assert_eq!(kind.classify("TIMED_OUT"), TaskState::TimedOut);
        assert_eq!(kind.classify("CANCELED"), TaskState::Processing);
        assert_eq!(kind.classify("TIMEDOUT"), TaskState::Processing);
    }

    #[test]
    fn avatar_build_vocabulary() {
        let kind = TaskKind::AvatarBuild;
        assert_eq!(kind.classify("READY"), TaskState::Completed);
        assert_eq!(kind.classify("ERROR"), TaskState::Failed);
        assert_eq!(kind.classify("BUILDING"), TaskState::Processing);
        assert_eq!(kind.classify("PENDING"), TaskState::Pending);
    }

    #[test]
    fn initial_labels() {
        assert_eq!(TaskKind::AvatarBuild.initial_label(), "PENDING");
        assert_eq!(TaskKind::ImageGenerate.initial_label(), "PROCESSING");
        assert_eq!(TaskKind::VideoGenerate.initial_label(), "PROCESSING");
    }

    #[test]
    fn payload_only_kept_when_completed() {
        let artifact = GeneratedArtifact::InlineBase64("QUJD".to_string());
        let status = TaskStatus::observe(
            TaskKind::ImageGenerate,
            "PROCESSING",
            Some(artifact.clone()),
            Some("ignored".to_string()),
        )
        .unwrap();
        assert!(status.payload().is_none());
        assert!(status.error_detail().is_none());

        let done =
            TaskStatus::observe(TaskKind::ImageGenerate, "COMPLETED", Some(artifact), None)
                .unwrap();
        assert_eq!(done.state(), TaskState::Completed);
        assert!(done.payload().is_some());
    }

    #[test]
    fn error_detail_only_kept_on_failure() {
        let failed = TaskStatus::observe(
            TaskKind::VideoGenerate,
            "FAILED",
            None,
            Some("quota exceeded".to_string()),
        )
        .unwrap();
        assert_eq!(failed.error_detail(), Some("quota exceeded"));

        let blank =
            TaskStatus::observe(TaskKind::VideoGenerate, "FAILED", None, Some("  ".to_string()))
                .unwrap();
        assert!(blank.error_detail().is_none());
    }

    #[test]
    fn completed_without_payload_is_rejected() {
        let err = TaskStatus::observe(TaskKind::AvatarGenerate, "COMPLETED", None, None)
            .unwrap_err();
        assert!(matches!(err, MirakoError::UnexpectedResponse(_)));
    }
}
