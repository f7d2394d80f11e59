//! Test helpers for engine tests
//!
//! Step builders and the container-membership check

use crate::engine::{Engine, Task, TaskId};
use crate::steps::{parse_code_to_steps, ActionTag, NodeKind, Priority, QueueId, Step};
use std::collections::BTreeMap;

/// Synchronous call-stack step
pub fn sync_step(description: &str) -> Step {
    Step::sync(
        NodeKind::ExpressionStatement,
        ActionTag::Statement,
        1,
        description.to_string(),
    )
}

/// Timer step waiting `delay_ms` in the pending registry
pub fn timer_step(description: &str, delay_ms: u64) -> Step {
    Step {
        is_async: true,
        delay_ms,
        target_queue: QueueId::PendingAsync,
        ..Step::sync(
            NodeKind::ExpressionStatement,
            ActionTag::Timer,
            1,
            description.to_string(),
        )
    }
}

/// High-priority deferred step
pub fn deferred_step(description: &str) -> Step {
    Step {
        is_async: true,
        target_queue: QueueId::DeferredQueue,
        priority: Priority::High,
        ..Step::sync(
            NodeKind::ExpressionStatement,
            ActionTag::Deferred,
            1,
            description.to_string(),
        )
    }
}

/// Extract steps from `source` and admit all of them, in order
pub fn admit_source(engine: &mut Engine, source: &str) -> Vec<Task> {
    parse_code_to_steps(source)
        .iter()
        .map(|step| engine.admit(step))
        .collect()
}

/// Description of the task `select_next` would pick
pub fn next_description(engine: &Engine) -> Option<String> {
    engine.select_next().map(|task| task.description.clone())
}

/// Select, begin and complete the next task; returns its description
pub fn run_next(engine: &mut Engine) -> Option<String> {
    let id = engine.select_next()?.id;
    let task = engine.begin_execution(id).expect("begin_execution failed");
    engine.complete(id).expect("complete failed");
    Some(task.description)
}

/// Assert every known task sits in exactly one place
pub fn assert_partitioned(engine: &Engine) {
    let mut seen: BTreeMap<TaskId, usize> = BTreeMap::new();
    for queue in QueueId::ALL {
        for task in engine.queue(queue) {
            assert_eq!(task.queue, queue, "task {} is tagged with the wrong queue", task.id);
            *seen.entry(task.id).or_default() += 1;
        }
    }
    for task in engine.in_flight() {
        *seen.entry(task.id).or_default() += 1;
    }
    for task in engine.finished() {
        *seen.entry(task.id).or_default() += 1;
    }
    for (id, count) in seen {
        assert_eq!(count, 1, "task {} appears in {} places", id, count);
    }
}
