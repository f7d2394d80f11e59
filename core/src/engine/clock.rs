//! Virtual clock and timer schedule
//!
//! Time never comes from the system: the clock only moves when the engine is
//! told to advance it, which keeps timer ordering deterministic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::task::TaskId;

/// A fully deterministic virtual clock
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualClock {
    /// Current virtual time in milliseconds
    current_ms: u64,
    /// Next timer registration sequence
    next_timer_seq: u64,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.current_ms
    }

    /// Advance the clock to the given time; never moves backwards
    pub fn advance_to(&mut self, target_ms: u64) {
        if target_ms > self.current_ms {
            self.current_ms = target_ms;
        }
    }

    pub fn advance_by(&mut self, ms: u64) {
        self.current_ms = self.current_ms.saturating_add(ms);
    }

    /// Register a timer and return its sequence number
    pub fn register_timer(&mut self) -> u64 {
        let seq = self.next_timer_seq;
        self.next_timer_seq += 1;
        seq
    }
}

/// Scheduled timer entry
///
/// Ordered by due time, then registration sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerEntry {
    pub due_at_ms: u64,
    pub seq: u64,
    pub task_id: TaskId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimerSchedule {
    entries: BTreeSet<TimerEntry>,
}

impl TimerSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, entry: TimerEntry) {
        self.entries.insert(entry);
    }

    /// Remove every entry due at or before `now_ms`, in elapsed order
    pub fn pop_due(&mut self, now_ms: u64) -> Vec<TimerEntry> {
        let mut due = Vec::new();
        while let Some(first) = self.entries.first().copied() {
            if first.due_at_ms > now_ms {
                break;
            }
            self.entries.remove(&first);
            due.push(first);
        }
        due
    }

    /// Drop the entry for `task_id`, if any
    pub fn cancel(&mut self, task_id: TaskId) -> Option<TimerEntry> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.task_id == task_id)
            .copied()?;
        self.entries.remove(&entry);
        Some(entry)
    }

    pub fn next_due(&self) -> Option<u64> {
        self.entries.first().map(|entry| entry.due_at_ms)
    }

    pub fn entries(&self) -> impl Iterator<Item = &TimerEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
