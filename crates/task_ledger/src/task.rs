use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the source material comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A file already on disk (or uploaded and staged by the backend).
    File,
    /// A remote link the backend downloads itself.
    Url,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Terminal states accept no further automatic transition; retrying a
    /// failed source means enqueueing a fresh task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// One unit of work: a single source on its way to a summary artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub source: String,
    pub label: Option<String>,
    pub status: TaskStatus,
    /// 0..=100, non-decreasing within an attempt.
    pub progress: u8,
    /// Latest human-readable status line, overwritten on every update.
    pub message: String,
    /// Set exactly when `status` is `Completed`.
    pub output_path: Option<String>,
    /// Set exactly when `status` is `Failed`.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Display name: the label when present, otherwise the raw source.
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.source)
    }
}

/// Partial update applied to a task. Absent fields leave the stored value
/// untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub label: Option<String>,
    /// The wire spells this `outputLocation`.
    #[serde(alias = "outputLocation")]
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl TaskPatch {
    pub fn progress(status: TaskStatus, progress: u8, message: impl Into<String>) -> Self {
        TaskPatch {
            status: Some(status),
            progress: Some(progress),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn completed(output_path: impl Into<String>) -> Self {
        TaskPatch {
            status: Some(TaskStatus::Completed),
            progress: Some(100),
            message: Some("Done".to_string()),
            output_path: Some(output_path.into()),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        TaskPatch {
            status: Some(TaskStatus::Failed),
            message: Some(error.clone()),
            error: Some(error),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("task source must not be empty")]
    EmptySource,
}
