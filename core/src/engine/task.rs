//! Task records created when steps are admitted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::steps::classifier::describe_value;
use crate::steps::{ActionTag, Priority, QueueId, Step};

/// Unique, monotonically increasing task identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    Script,
    Console,
    Timer,
    Network,
    Deferred,
    Error,
}

impl From<ActionTag> for TaskKind {
    fn from(action: ActionTag) -> Self {
        match action {
            ActionTag::Console => TaskKind::Console,
            ActionTag::Timer => TaskKind::Timer,
            ActionTag::Network => TaskKind::Network,
            ActionTag::Deferred => TaskKind::Deferred,
            ActionTag::Error => TaskKind::Error,
            ActionTag::VariableDeclaration
            | ActionTag::VariableAssignment
            | ActionTag::FunctionDeclaration
            | ActionTag::FunctionCall
            | ActionTag::Conditional
            | ActionTag::Loop
            | ActionTag::Statement => TaskKind::Script,
        }
    }
}

/// Task status
///
/// `Pending → Executing → {Completed | Error}`. Tasks waiting on a timer start
/// as `Waiting` and become `Pending` when they reach the callback queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Waiting,
    Pending,
    Executing,
    Completed,
    Error,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::Pending => "pending",
            TaskStatus::Executing => "executing",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    pub delay_ms: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    /// Container the task was admitted to or last moved into
    pub queue: QueueId,
    /// Only deferred-queue tasks are high priority
    #[serde(default)]
    pub priority: Priority,
    pub source_line: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl Task {
    pub(crate) fn from_step(id: TaskId, step: &Step) -> Self {
        let status = match step.target_queue {
            QueueId::PendingAsync => TaskStatus::Waiting,
            _ => TaskStatus::Pending,
        };
        let priority = match step.target_queue {
            QueueId::DeferredQueue => step.priority,
            _ => Priority::Normal,
        };

        // Bound values double as the result of a declaration/assignment
        let payload = step.output_payload.clone().or_else(|| {
            if step.bound_variables.is_empty() {
                None
            } else {
                Some(
                    step.bound_variables
                        .iter()
                        .map(|(name, value)| format!("{} = {}", name, describe_value(value)))
                        .collect::<Vec<_>>()
                        .join(", "),
                )
            }
        });

        Self {
            id,
            kind: step.action.into(),
            description: step.description.clone(),
            delay_ms: step.delay_ms,
            status,
            created_at: Utc::now(),
            queue: step.target_queue,
            priority,
            source_line: step.source_line,
            payload,
        }
    }
}
