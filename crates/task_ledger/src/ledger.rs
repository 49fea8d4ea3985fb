use std::sync::{Mutex, MutexGuard};

use indexmap::IndexMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::task::{Task, TaskKind, TaskPatch, TaskStatus, ValidationError};

/// Emitted on every mutation, carrying a snapshot of the affected task.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    Added(Task),
    Updated(Task),
    Removed(String),
}

/// Insertion-ordered, observable store of tasks.
///
/// All methods are synchronous and infallible apart from [`TaskLedger::enqueue`];
/// updates addressed to an id the ledger no longer holds are dropped with a
/// log line, since remote events routinely race local removals.
#[derive(Debug)]
pub struct TaskLedger {
    tasks: Mutex<IndexMap<String, Task>>,
    events: broadcast::Sender<LedgerEvent>,
}

impl TaskLedger {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        TaskLedger {
            tasks: Mutex::new(IndexMap::new()),
            events,
        }
    }

    /// Register a new task in `Pending`. The id is generated here and never
    /// changes. The only rejected input is a blank source.
    pub fn enqueue(
        &self,
        kind: TaskKind,
        source: impl Into<String>,
        label: Option<String>,
    ) -> Result<Task, ValidationError> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(ValidationError::EmptySource);
        }

        let task = Task {
            id: Uuid::new_v4().to_string(),
            kind,
            source,
            label,
            status: TaskStatus::Pending,
            progress: 0,
            message: "Queued".to_string(),
            output_path: None,
            error: None,
            created_at: chrono::Utc::now(),
        };

        self.lock().insert(task.id.clone(), task.clone());
        tracing::debug!(task_id = %task.id, kind = ?task.kind, "Queued task");
        let _ = self.events.send(LedgerEvent::Added(task.clone()));
        Ok(task)
    }

    /// Merge a partial update into the task with the given id.
    ///
    /// Returns false (and changes nothing) when the id is unknown. Terminal
    /// tasks keep their status; late remote updates cannot resurrect them.
    pub fn apply(&self, id: &str, patch: TaskPatch) -> bool {
        let mut tasks = self.lock();
        let Some(task) = tasks.get_mut(id) else {
            drop(tasks);
            tracing::debug!(task_id = %id, "Dropping update for unknown task");
            return false;
        };

        merge(task, patch);
        let snapshot = task.clone();
        drop(tasks);

        let _ = self.events.send(LedgerEvent::Updated(snapshot));
        true
    }

    /// Remove a task in any state. Does not cancel remote work already
    /// running for it; later events for the id become no-ops.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.lock().shift_remove(id).is_some();
        if removed {
            tracing::debug!(task_id = %id, "Removed task");
            let _ = self.events.send(LedgerEvent::Removed(id.to_string()));
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.lock().get(id).cloned()
    }

    /// All tasks in insertion order.
    pub fn list(&self) -> Vec<Task> {
        self.lock().values().cloned().collect()
    }

    /// Tasks still waiting to be started, in insertion order.
    pub fn pending(&self) -> Vec<Task> {
        self.lock()
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Task>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for TaskLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn merge(task: &mut Task, patch: TaskPatch) {
    if let Some(status) = patch.status {
        if status != task.status {
            if task.status.is_terminal() {
                tracing::debug!(
                    task_id = %task.id,
                    current = ?task.status,
                    requested = ?status,
                    "Ignoring status change on terminal task"
                );
            } else if status == TaskStatus::Completed && task.status == TaskStatus::Pending {
                // completion is only reachable through an active state
                tracing::debug!(task_id = %task.id, "Ignoring completion of a task that never started");
            } else if status == TaskStatus::Completed && patch.output_path.is_none() {
                tracing::debug!(task_id = %task.id, "Ignoring completion without an output location");
            } else {
                match status {
                    TaskStatus::Completed => task.error = None,
                    TaskStatus::Failed => task.output_path = None,
                    _ => {
                        task.error = None;
                        task.output_path = None;
                    }
                }
                if status == TaskStatus::Pending {
                    task.progress = 0;
                }
                task.status = status;
            }
        }
    }

    if let Some(progress) = patch.progress {
        // Non-decreasing within an attempt; a re-queued or failed task may
        // report anything.
        if progress >= task.progress
            || matches!(task.status, TaskStatus::Pending | TaskStatus::Failed)
        {
            task.progress = progress.min(100);
        }
    }

    if let Some(message) = patch.message {
        task.message = message;
    }
    if let Some(label) = patch.label {
        task.label = Some(label);
    }

    // Artifact and error slots exist only in their matching terminal state,
    // and never together.
    if let Some(output_path) = patch.output_path {
        if task.status == TaskStatus::Completed {
            task.output_path = Some(output_path);
        } else {
            tracing::debug!(task_id = %task.id, "Ignoring output path on non-completed task");
        }
    }
    if let Some(error) = patch.error {
        if task.status == TaskStatus::Failed {
            task.error = Some(error);
        } else {
            tracing::debug!(task_id = %task.id, "Ignoring error detail on non-failed task");
        }
    }

    // The service reports pipeline failures as status/progress/message only;
    // a failed task must still end up with an error detail.
    if task.status == TaskStatus::Failed && task.error.is_none() {
        task.error = Some(task.message.clone());
    }
}
