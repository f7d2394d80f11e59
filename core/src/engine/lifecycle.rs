//! Task lifecycle transitions
//!
//! `Pending → Executing` on [`Engine::begin_execution`], then `Completed` or
//! `Error`. Invalid requests are logged, recorded as warnings in the trace and
//! leave the engine untouched.

use super::errors::{EngineError, EngineResult};
use super::task::{Task, TaskId, TaskStatus};
use super::trace::TraceKind;
use super::{Engine, TaskKind};
use crate::steps::QueueId;

impl Engine {
    /// Remove a pending task from its container and mark it executing
    pub fn begin_execution(&mut self, id: TaskId) -> EngineResult<Task> {
        let status = match self.queues.find(id) {
            Some(task) => task.status,
            None => return Err(self.missing_or_invalid(id, TaskStatus::Executing)),
        };
        if status != TaskStatus::Pending {
            return Err(self.report(EngineError::InvalidTransition {
                id,
                from: status,
                to: TaskStatus::Executing,
            }));
        }

        let Some(mut task) = self.queues.take(id) else {
            return Err(self.report(EngineError::TaskNotFound(id)));
        };
        task.status = TaskStatus::Executing;

        tracing::debug!(task = %id, queue = %task.queue, "Executing task");
        self.trace.record(
            self.clock.now_ms(),
            Some(id),
            TraceKind::Started,
            format!("Started {}", task.description),
        );

        self.in_flight.insert(id, task.clone());
        Ok(task)
    }

    /// Mark an executing task completed
    ///
    /// Tasks with a payload (console output, bound values) also record a
    /// result event.
    pub fn complete(&mut self, id: TaskId) -> EngineResult<Task> {
        let Some(mut task) = self.in_flight.remove(&id) else {
            return Err(self.missing_or_invalid(id, TaskStatus::Completed));
        };
        task.status = TaskStatus::Completed;

        let now = self.clock.now_ms();
        self.trace.record(
            now,
            Some(id),
            TraceKind::Completed,
            format!("Completed {}", task.description),
        );
        if let Some(payload) = &task.payload {
            let message = match task.kind {
                TaskKind::Console => payload.clone(),
                _ => format!("Result: {}", payload),
            };
            self.trace.record(now, Some(id), TraceKind::Result, message);
        }

        self.finished.push(task.clone());
        Ok(task)
    }

    /// Mark a task failed
    ///
    /// Executing tasks leave the in-flight table; queued tasks are removed
    /// from their container (and their timer, if any, is cancelled).
    pub fn fail(&mut self, id: TaskId, message: &str) -> EngineResult<Task> {
        let task = match self.in_flight.remove(&id) {
            Some(task) => Some(task),
            None => {
                if self.queues.locate(id) == Some(QueueId::PendingAsync) {
                    self.timers.cancel(id);
                }
                self.queues.take(id)
            }
        };
        let Some(mut task) = task else {
            return Err(self.missing_or_invalid(id, TaskStatus::Error));
        };
        task.status = TaskStatus::Error;

        tracing::warn!(task = %id, reason = message, "Task failed");
        self.trace.record(
            self.clock.now_ms(),
            Some(id),
            TraceKind::Error,
            format!("{}: {}", task.description, message),
        );

        self.finished.push(task.clone());
        Ok(task)
    }

    /// Clear every container, the timer schedule, the trace and the clock
    ///
    /// Task ids keep increasing across resets.
    pub fn reset(&mut self) {
        tracing::info!(
            queued = self.queues.len(),
            in_flight = self.in_flight.len(),
            timers = self.timers.len(),
            "Resetting engine"
        );
        self.queues.clear();
        self.in_flight.clear();
        self.finished.clear();
        self.timers.clear();
        self.trace.clear();
        self.clock = Default::default();
    }

    fn missing_or_invalid(&mut self, id: TaskId, to: TaskStatus) -> EngineError {
        let err = match self.task(id) {
            Some(task) => EngineError::InvalidTransition {
                id,
                from: task.status,
                to,
            },
            None => EngineError::TaskNotFound(id),
        };
        self.report(err)
    }
}
