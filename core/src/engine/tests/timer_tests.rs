//! Tests for the virtual clock and timer elapsation

use super::helpers::*;
use crate::engine::{Engine, EngineError, TaskId, TaskStatus, TimerEntry, TimerSchedule};

#[test]
fn test_shorter_timer_elapses_first_regardless_of_admission_order() {
    let mut engine = Engine::new();
    let slow = engine.admit(&timer_step("slow", 1000));
    let fast = engine.admit(&timer_step("fast", 500));

    let released = engine.advance_clock(1000);
    assert_eq!(released, vec![fast.id, slow.id]);

    let order: Vec<_> = engine.callback_queue().iter().map(|t| t.id).collect();
    assert_eq!(order, vec![fast.id, slow.id]);
    assert!(engine
        .callback_queue()
        .iter()
        .all(|t| t.status == TaskStatus::Pending));
}

#[test]
fn test_equal_due_times_keep_registration_order() {
    let mut engine = Engine::new();
    let a = engine.admit(&timer_step("a", 100));
    let b = engine.admit(&timer_step("b", 100));
    let c = engine.admit(&timer_step("c", 100));

    assert_eq!(engine.advance_clock(100), vec![a.id, b.id, c.id]);
}

#[test]
fn test_timers_release_incrementally() {
    let mut engine = Engine::new();
    let first = engine.admit(&timer_step("first", 300));
    let second = engine.admit(&timer_step("second", 700));

    assert!(engine.advance_clock(299).is_empty());
    assert_eq!(engine.advance_clock(1), vec![first.id]);
    assert_eq!(engine.next_timer_due(), Some(700));
    assert_eq!(engine.advance_clock_to(700), vec![second.id]);
    assert_eq!(engine.next_timer_due(), None);
    assert_eq!(engine.now_ms(), 700);
}

#[test]
fn test_delay_is_relative_to_admission_time() {
    let mut engine = Engine::new();
    engine.advance_clock(1000);
    engine.admit(&timer_step("late", 50));
    assert_eq!(engine.next_timer_due(), Some(1050));
}

#[test]
fn test_advance_timer_moves_task_atomically() {
    let mut engine = Engine::new();
    let task = engine.admit(&timer_step("manual", 10_000));

    engine.advance_timer(task.id).expect("advance_timer");

    assert!(engine.pending_async().is_empty());
    assert_eq!(engine.callback_queue().len(), 1);
    assert_eq!(engine.callback_queue()[0].id, task.id);
    assert!(engine.timers().is_empty());
    assert_partitioned(&engine);
}

#[test]
fn test_advance_timer_unknown_task_is_a_logged_no_op() {
    let mut engine = Engine::new();
    engine.admit(&timer_step("t", 10));
    let before = engine.snapshot();

    let err = engine.advance_timer(TaskId(999)).expect_err("should fail");
    assert_eq!(err, EngineError::TaskNotFound(TaskId(999)));

    let after = engine.snapshot();
    assert_eq!(before.pending_async, after.pending_async);
    assert_eq!(before.callback_queue, after.callback_queue);
    assert_eq!(before.timers, after.timers);
}

#[test]
fn test_advance_timer_on_call_stack_task_is_rejected() {
    let mut engine = Engine::new();
    let task = engine.admit(&sync_step("sync"));

    let err = engine.advance_timer(task.id).expect_err("should fail");
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
    assert_eq!(engine.call_stack().len(), 1);
}

#[test]
fn test_reset_cancels_timers() {
    let mut engine = Engine::new();
    engine.admit(&timer_step("t", 10));
    engine.reset();

    assert!(engine.advance_clock(100).is_empty());
    assert!(engine.callback_queue().is_empty());
    assert_eq!(engine.now_ms(), 100);
}

#[test]
fn test_schedule_orders_by_due_then_seq() {
    let mut schedule = TimerSchedule::new();
    schedule.schedule(TimerEntry {
        due_at_ms: 20,
        seq: 0,
        task_id: TaskId(1),
    });
    schedule.schedule(TimerEntry {
        due_at_ms: 10,
        seq: 2,
        task_id: TaskId(3),
    });
    schedule.schedule(TimerEntry {
        due_at_ms: 10,
        seq: 1,
        task_id: TaskId(2),
    });

    let due: Vec<_> = schedule.pop_due(15).iter().map(|e| e.task_id).collect();
    assert_eq!(due, vec![TaskId(2), TaskId(3)]);
    assert_eq!(schedule.next_due(), Some(20));
    assert!(schedule.cancel(TaskId(1)).is_some());
    assert!(schedule.is_empty());
}
