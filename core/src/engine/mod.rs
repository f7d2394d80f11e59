//! Queue state machine and task lifecycle tracker
//!
//! The [`Engine`] owns the four task containers, the virtual clock with its
//! timer schedule, the in-flight table and the trace log. Steps are admitted
//! as tasks, timers move tasks from the pending registry to the callback
//! queue, and [`Engine::select_next`] picks the next runnable task:
//!
//! 1. deferred queue head (drained before anything else)
//! 2. callback queue head
//! 3. call stack top (the most recently admitted synchronous task)
//!
//! All state lives on the instance; there are no globals.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

pub mod clock;
pub mod errors;
mod lifecycle;
pub mod queues;
pub mod task;
pub mod trace;

#[cfg(test)]
mod tests;

pub use clock::{TimerEntry, TimerSchedule, VirtualClock};
pub use errors::{EngineError, EngineResult};
pub use queues::Queues;
pub use task::{Task, TaskId, TaskKind, TaskStatus};
pub use trace::{TraceEvent, TraceKind, TraceLog, DEFAULT_TRACE_CAPACITY};

use crate::steps::{QueueId, Step};

/* ===================== Engine ===================== */

#[derive(Debug, Clone)]
pub struct Engine {
    queues: Queues,
    /// Tasks between `begin_execution` and `complete`/`fail`
    in_flight: BTreeMap<TaskId, Task>,
    finished: Vec<Task>,
    clock: VirtualClock,
    timers: TimerSchedule,
    trace: TraceLog,
    next_id: u64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_trace_capacity(DEFAULT_TRACE_CAPACITY)
    }

    pub fn with_trace_capacity(capacity: usize) -> Self {
        Self {
            queues: Queues::new(),
            in_flight: BTreeMap::new(),
            finished: Vec::new(),
            clock: VirtualClock::new(),
            timers: TimerSchedule::new(),
            trace: TraceLog::with_capacity(capacity),
            next_id: 1,
        }
    }

    /* ===================== Admission ===================== */

    /// Create a task from `step` and append it to the step's target container
    ///
    /// Tasks bound for the pending registry start `Waiting` and get a timer
    /// due `delay_ms` after the current virtual time; everything else starts
    /// `Pending`. A high priority is kept only for deferred-queue tasks.
    pub fn admit(&mut self, step: &Step) -> Task {
        let id = TaskId(self.next_id);
        self.next_id += 1;

        let task = Task::from_step(id, step);
        let now = self.clock.now_ms();

        if task.priority != step.priority {
            tracing::debug!(
                task = %id,
                queue = %task.queue,
                "High priority only applies to the deferred queue; admitted as normal"
            );
        }

        if task.queue == QueueId::PendingAsync {
            let seq = self.clock.register_timer();
            self.timers.schedule(TimerEntry {
                due_at_ms: now.saturating_add(task.delay_ms),
                seq,
                task_id: id,
            });
        }

        tracing::debug!(
            task = %id,
            queue = %task.queue,
            line = task.source_line,
            "Admitted task"
        );
        self.trace.record(
            now,
            Some(id),
            TraceKind::Admitted,
            format!("{} → {}", task.description, task.queue),
        );

        self.queues.push(task.clone());
        task
    }

    /* ===================== Selection ===================== */

    /// Next runnable task, without removing it
    ///
    /// Pure: calling it repeatedly without an intervening `begin_execution`
    /// returns the same task.
    pub fn select_next(&self) -> Option<&Task> {
        self.queues
            .head(QueueId::DeferredQueue)
            .or_else(|| self.queues.head(QueueId::CallbackQueue))
            .or_else(|| self.queues.tail(QueueId::CallStack))
    }

    /* ===================== Timers ===================== */

    /// Move a waiting task from the pending registry to the callback queue
    pub fn advance_timer(&mut self, id: TaskId) -> EngineResult<()> {
        match self.queues.locate(id) {
            Some(QueueId::PendingAsync) => {}
            _ => {
                let err = match self.task(id) {
                    Some(task) => EngineError::InvalidTransition {
                        id,
                        from: task.status,
                        to: TaskStatus::Pending,
                    },
                    None => EngineError::TaskNotFound(id),
                };
                return Err(self.report(err));
            }
        }

        self.timers.cancel(id);
        let Some(mut task) = self.queues.take(id) else {
            return Err(self.report(EngineError::TaskNotFound(id)));
        };
        task.status = TaskStatus::Pending;
        task.queue = QueueId::CallbackQueue;

        tracing::info!(task = %id, at_ms = self.clock.now_ms(), "Timer elapsed");
        self.trace.record(
            self.clock.now_ms(),
            Some(id),
            TraceKind::TimerElapsed,
            format!("{} → {}", task.description, QueueId::CallbackQueue),
        );
        self.queues.push(task);
        Ok(())
    }

    /// Move virtual time forward by `ms` and release every due timer
    ///
    /// Returns the released task ids in elapsed order: due time first, then
    /// registration order.
    pub fn advance_clock(&mut self, ms: u64) -> Vec<TaskId> {
        self.clock.advance_by(ms);
        self.release_due_timers()
    }

    /// Move virtual time forward to `target_ms` (never backwards)
    pub fn advance_clock_to(&mut self, target_ms: u64) -> Vec<TaskId> {
        self.clock.advance_to(target_ms);
        self.release_due_timers()
    }

    fn release_due_timers(&mut self) -> Vec<TaskId> {
        let due = self.timers.pop_due(self.clock.now_ms());
        due.into_iter()
            .filter_map(|entry| self.advance_timer(entry.task_id).ok().map(|_| entry.task_id))
            .collect()
    }

    /// Earliest due time among scheduled timers
    pub fn next_timer_due(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /* ===================== Snapshots ===================== */

    pub fn call_stack(&self) -> &VecDeque<Task> {
        &self.queues.call_stack
    }

    pub fn pending_async(&self) -> &VecDeque<Task> {
        &self.queues.pending_async
    }

    pub fn callback_queue(&self) -> &VecDeque<Task> {
        &self.queues.callback_queue
    }

    pub fn deferred_queue(&self) -> &VecDeque<Task> {
        &self.queues.deferred_queue
    }

    pub fn queue(&self, queue: QueueId) -> &VecDeque<Task> {
        self.queues.get(queue)
    }

    pub fn in_flight(&self) -> impl Iterator<Item = &Task> {
        self.in_flight.values()
    }

    pub fn finished(&self) -> &[Task] {
        &self.finished
    }

    pub fn trace(&self) -> &TraceLog {
        &self.trace
    }

    pub fn timers(&self) -> &TimerSchedule {
        &self.timers
    }

    /// Look a task up wherever it currently is
    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.queues
            .find(id)
            .or_else(|| self.in_flight.get(&id))
            .or_else(|| self.finished.iter().find(|task| task.id == id))
    }

    /// Nothing queued and nothing executing
    pub fn is_idle(&self) -> bool {
        self.queues.is_empty() && self.in_flight.is_empty()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            now_ms: self.clock.now_ms(),
            call_stack: self.queues.call_stack.iter().cloned().collect(),
            pending_async: self.queues.pending_async.iter().cloned().collect(),
            callback_queue: self.queues.callback_queue.iter().cloned().collect(),
            deferred_queue: self.queues.deferred_queue.iter().cloned().collect(),
            in_flight: self.in_flight.values().cloned().collect(),
            finished: self.finished.clone(),
            timers: self.timers.entries().copied().collect(),
            trace: self.trace.iter().cloned().collect(),
        }
    }

    /// Log a recovered error and record it in the trace
    fn report(&mut self, err: EngineError) -> EngineError {
        let task_id = match &err {
            EngineError::TaskNotFound(id) => *id,
            EngineError::InvalidTransition { id, .. } => *id,
        };
        tracing::warn!(task = %task_id, error = %err, "Engine operation ignored");
        self.trace.record(
            self.clock.now_ms(),
            Some(task_id),
            TraceKind::Warning,
            err.to_string(),
        );
        err
    }
}

/// Serializable copy of the engine state, for renderers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub now_ms: u64,
    pub call_stack: Vec<Task>,
    pub pending_async: Vec<Task>,
    pub callback_queue: Vec<Task>,
    pub deferred_queue: Vec<Task>,
    pub in_flight: Vec<Task>,
    pub finished: Vec<Task>,
    pub timers: Vec<TimerEntry>,
    pub trace: Vec<TraceEvent>,
}
