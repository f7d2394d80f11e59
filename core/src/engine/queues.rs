//! The four task containers
//!
//! Every queued task lives in exactly one container. Moves go through
//! [`Queues::take`] followed by [`Queues::push`], so a task is never copied.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::task::{Task, TaskId};
use crate::steps::QueueId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Queues {
    pub call_stack: VecDeque<Task>,
    pub pending_async: VecDeque<Task>,
    pub callback_queue: VecDeque<Task>,
    pub deferred_queue: VecDeque<Task>,
}

impl Queues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, queue: QueueId) -> &VecDeque<Task> {
        match queue {
            QueueId::CallStack => &self.call_stack,
            QueueId::PendingAsync => &self.pending_async,
            QueueId::CallbackQueue => &self.callback_queue,
            QueueId::DeferredQueue => &self.deferred_queue,
        }
    }

    fn get_mut(&mut self, queue: QueueId) -> &mut VecDeque<Task> {
        match queue {
            QueueId::CallStack => &mut self.call_stack,
            QueueId::PendingAsync => &mut self.pending_async,
            QueueId::CallbackQueue => &mut self.callback_queue,
            QueueId::DeferredQueue => &mut self.deferred_queue,
        }
    }

    /// Append `task` to the container it names
    pub fn push(&mut self, task: Task) {
        self.get_mut(task.queue).push_back(task);
    }

    /// Head of a container, without removing it
    pub fn head(&self, queue: QueueId) -> Option<&Task> {
        self.get(queue).front()
    }

    /// Most recently pushed task of a container
    pub fn tail(&self, queue: QueueId) -> Option<&Task> {
        self.get(queue).back()
    }

    /// Container currently holding `id`
    pub fn locate(&self, id: TaskId) -> Option<QueueId> {
        QueueId::ALL
            .into_iter()
            .find(|queue| self.get(*queue).iter().any(|task| task.id == id))
    }

    pub fn find(&self, id: TaskId) -> Option<&Task> {
        QueueId::ALL
            .iter()
            .find_map(|queue| self.get(*queue).iter().find(|task| task.id == id))
    }

    /// Remove `id` from whichever container holds it
    pub fn take(&mut self, id: TaskId) -> Option<Task> {
        let queue = self.locate(id)?;
        let container = self.get_mut(queue);
        let index = container.iter().position(|task| task.id == id)?;
        container.remove(index)
    }

    pub fn len(&self) -> usize {
        QueueId::ALL.iter().map(|queue| self.get(*queue).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.call_stack.clear();
        self.pending_async.clear();
        self.callback_queue.clear();
        self.deferred_queue.clear();
    }
}
