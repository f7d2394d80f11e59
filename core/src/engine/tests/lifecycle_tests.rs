//! Tests for task status transitions and reset

use super::helpers::*;
use crate::engine::{Engine, EngineError, TaskId, TaskStatus, TraceKind};

#[test]
fn test_begin_complete_transitions() {
    let mut engine = Engine::new();
    let task = engine.admit(&sync_step("work"));

    let running = engine.begin_execution(task.id).expect("begin");
    assert_eq!(running.status, TaskStatus::Executing);
    assert!(engine.call_stack().is_empty());
    assert_eq!(engine.in_flight().count(), 1);

    let done = engine.complete(task.id).expect("complete");
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(engine.in_flight().count(), 0);
    assert_eq!(engine.finished().len(), 1);
    assert!(engine.is_idle());
}

#[test]
fn test_begin_execution_rejects_waiting_task() {
    let mut engine = Engine::new();
    let task = engine.admit(&timer_step("t", 100));

    let err = engine.begin_execution(task.id).expect_err("should fail");
    assert_eq!(
        err,
        EngineError::InvalidTransition {
            id: task.id,
            from: TaskStatus::Waiting,
            to: TaskStatus::Executing,
        }
    );
    assert_eq!(engine.pending_async().len(), 1);
}

#[test]
fn test_complete_pending_task_is_invalid() {
    let mut engine = Engine::new();
    let task = engine.admit(&sync_step("not started"));

    let err = engine.complete(task.id).expect_err("should fail");
    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(engine.call_stack().len(), 1);
}

#[test]
fn test_unknown_task_is_not_found_and_traced() {
    let mut engine = Engine::new();
    let err = engine.complete(TaskId(42)).expect_err("should fail");
    assert_eq!(err, EngineError::TaskNotFound(TaskId(42)));

    let last = engine.trace().iter().last().expect("warning recorded");
    assert_eq!(last.kind, TraceKind::Warning);
    assert_eq!(last.task_id, Some(TaskId(42)));
}

#[test]
fn test_completing_twice_is_rejected() {
    let mut engine = Engine::new();
    let task = engine.admit(&sync_step("once"));
    engine.begin_execution(task.id).expect("begin");
    engine.complete(task.id).expect("complete");

    assert!(matches!(
        engine.complete(task.id),
        Err(EngineError::InvalidTransition {
            from: TaskStatus::Completed,
            ..
        })
    ));
    assert_eq!(engine.finished().len(), 1);
}

#[test]
fn test_fail_executing_task() {
    let mut engine = Engine::new();
    let task = engine.admit(&sync_step("boom"));
    engine.begin_execution(task.id).expect("begin");

    let failed = engine.fail(task.id, "exploded").expect("fail");
    assert_eq!(failed.status, TaskStatus::Error);

    let last = engine.trace().iter().last().expect("error recorded");
    assert_eq!(last.kind, TraceKind::Error);
    assert!(last.message.contains("exploded"));
}

#[test]
fn test_fail_waiting_task_cancels_its_timer() {
    let mut engine = Engine::new();
    let task = engine.admit(&timer_step("t", 100));

    engine.fail(task.id, "cancelled").expect("fail");
    assert!(engine.pending_async().is_empty());
    assert!(engine.timers().is_empty());
    assert!(engine.advance_clock(100).is_empty());
    assert_partitioned(&engine);
}

#[test]
fn test_console_completion_records_result_event() {
    let mut engine = Engine::new();
    let tasks = admit_source(&mut engine, "console.log('hello', 42)");
    let id = tasks[0].id;

    engine.begin_execution(id).expect("begin");
    engine.complete(id).expect("complete");

    let kinds: Vec<_> = engine.trace().iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            TraceKind::Admitted,
            TraceKind::Started,
            TraceKind::Completed,
            TraceKind::Result,
        ]
    );
    let result = engine.trace().iter().last().expect("result");
    assert_eq!(result.message, "hello 42");
}

#[test]
fn test_reset_clears_state_but_not_ids() {
    let mut engine = Engine::new();
    let first = engine.admit(&sync_step("a"));
    engine.admit(&timer_step("b", 10));
    engine.admit(&deferred_step("c"));
    engine.advance_clock(5);

    engine.reset();

    assert!(engine.is_idle());
    assert!(engine.finished().is_empty());
    assert!(engine.trace().is_empty());
    assert!(engine.timers().is_empty());
    assert_eq!(engine.now_ms(), 0);

    let after = engine.admit(&sync_step("d"));
    assert!(after.id > first.id);
    assert_eq!(after.id, TaskId(4));
}
