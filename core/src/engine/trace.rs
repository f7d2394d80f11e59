//! Bounded trace log
//!
//! Append-only history of what the engine did. Once the log holds `capacity`
//! events, each new event evicts the oldest one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::task::TaskId;

pub const DEFAULT_TRACE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceKind {
    Admitted,
    TimerElapsed,
    Started,
    Completed,
    Result,
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    /// Position in the whole history, including evicted events
    pub seq: u64,
    /// Virtual time when the event was recorded
    pub at_ms: u64,
    pub logged_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    pub kind: TraceKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceLog {
    capacity: usize,
    next_seq: u64,
    events: VecDeque<TraceEvent>,
}

impl Default for TraceLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TRACE_CAPACITY)
    }
}

impl TraceLog {
    /// A capacity of zero is treated as one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            next_seq: 0,
            events: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(
        &mut self,
        at_ms: u64,
        task_id: Option<TaskId>,
        kind: TraceKind,
        message: impl Into<String>,
    ) -> &TraceEvent {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        let event = TraceEvent {
            seq: self.next_seq,
            at_ms,
            logged_at: Utc::now(),
            task_id,
            kind,
            message: message.into(),
        };
        self.next_seq += 1;
        self.events.push_back(event);
        &self.events[self.events.len() - 1]
    }

    pub fn events(&self) -> &VecDeque<TraceEvent> {
        &self.events
    }

    pub fn iter(&self) -> impl Iterator<Item = &TraceEvent> {
        self.events.iter()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events evicted so far
    pub fn evicted(&self) -> u64 {
        self.next_seq - self.events.len() as u64
    }

    /// Drop all events and restart numbering
    pub fn clear(&mut self) {
        self.events.clear();
        self.next_seq = 0;
    }
}
