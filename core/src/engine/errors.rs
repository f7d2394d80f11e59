//! Engine error types

use thiserror::Error;

use super::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    #[error("task {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
