//! Tests for the simulation loop and the wall-clock ticker

use super::*;
use crate::config::{Config, TickerConfig};
use crate::engine::{TaskStatus, TraceKind};
use crate::steps::QueueId;
use std::time::{Duration, Instant};

const SCENARIO: &str = "console.log('a'); setTimeout(()=>{}, 0); Promise.resolve()";

fn config_with(interval_ms: u64, speed: f64, fast_forward: bool) -> Config {
    Config {
        ticker: TickerConfig {
            interval_ms,
            speed,
            max_ticks: 1000,
            fast_forward,
        },
        ..Config::default()
    }
}

// ============================================================================
// Simulation
// ============================================================================

#[test]
fn test_load_admits_nothing_up_front() {
    let sim = Simulation::load(SCENARIO, &Config::default());
    assert_eq!(sim.steps().len(), 3);
    assert!(sim.engine().is_idle());
    assert!(!sim.is_done());
}

#[test]
fn test_scenario_runs_sync_then_deferred_then_callback() {
    let mut sim = Simulation::load(SCENARIO, &Config::default());
    let report = sim.run_to_completion();

    let queues: Vec<_> = report.executed.iter().map(|t| t.queue).collect();
    assert_eq!(
        queues,
        vec![
            QueueId::CallStack,
            QueueId::DeferredQueue,
            QueueId::CallbackQueue
        ]
    );
    assert_eq!(report.console, vec!["a".to_string()]);
    assert!(report.completed);
    assert_eq!(report.ticks, 4);
    assert_eq!(report.final_time_ms, 4000);
}

#[test]
fn test_tick_reports_each_phase() {
    let mut sim = Simulation::load(SCENARIO, &Config::default());

    let first = sim.tick();
    assert_eq!(first.tick, 1);
    assert_eq!(first.now_ms, 1000);
    assert_eq!(first.finished, None);
    assert!(first.released.is_empty());
    let started = first.started.expect("console task started");
    assert_eq!(started.queue, QueueId::CallStack);
    assert_eq!(started.description, "Log console.log('a')");

    let second = sim.tick();
    assert_eq!(second.finished, Some(started.id));
    assert_eq!(second.console.as_deref(), Some("a"));
    assert_eq!(second.released.len(), 1);
    let started = second.started.expect("deferred task started");
    assert_eq!(started.queue, QueueId::DeferredQueue);
}

#[test]
fn test_synchronous_steps_run_in_document_order() {
    let mut sim = Simulation::load(
        "console.log(1); console.log(2); console.log(3)",
        &Config::default(),
    );
    let report = sim.run_to_completion();

    assert_eq!(report.console, vec!["1", "2", "3"]);
    assert!(report.completed);
}

#[test]
fn test_timers_are_scheduled_when_admitted() {
    let mut sim = Simulation::load(
        "console.log(1); setTimeout(()=>{}, 500)",
        &config_with(1000, 1.0, false),
    );

    sim.tick();
    assert!(sim.engine().pending_async().is_empty());
    assert!(sim.engine().timers().is_empty());

    let second = sim.tick();
    assert_eq!(second.released.len(), 1);
    let admitted = sim
        .engine()
        .trace()
        .iter()
        .filter(|e| e.kind == TraceKind::Admitted)
        .map(|e| e.at_ms)
        .collect::<Vec<_>>();
    assert_eq!(admitted, vec![0, 1000]);
}

#[test]
fn test_fast_forward_jumps_to_next_timer() {
    let mut sim = Simulation::load("setTimeout(()=>{}, 5000)", &config_with(1000, 1.0, true));
    let report = sim.run_to_completion();

    assert_eq!(report.ticks, 2);
    assert_eq!(report.executed.len(), 1);
    assert_eq!(report.executed[0].started_at_ms, 5000);
}

#[test]
fn test_without_fast_forward_timers_wait_for_ticks() {
    let mut sim = Simulation::load("setTimeout(()=>{}, 5000)", &config_with(1000, 1.0, false));
    let report = sim.run_to_completion();

    assert_eq!(report.ticks, 6);
    assert_eq!(report.executed[0].started_at_ms, 5000);
}

#[test]
fn test_speed_scales_virtual_time_per_tick() {
    let mut sim = Simulation::load("console.log(1)", &config_with(1000, 2.0, true));
    assert_eq!(sim.virtual_step_ms(), 2000);

    sim.set_speed(0.5);
    assert_eq!(sim.virtual_step_ms(), 500);

    sim.set_speed(-1.0);
    assert_eq!(sim.speed(), 0.5);
}

#[test]
fn test_tick_limit_stops_run_early() {
    let config = Config {
        ticker: TickerConfig {
            max_ticks: 2,
            ..Config::default().ticker
        },
        ..Config::default()
    };
    let mut sim = Simulation::load("console.log(1); console.log(2); console.log(3)", &config);
    let report = sim.run_to_completion();

    assert_eq!(report.ticks, 2);
    assert!(!report.completed);
    assert_eq!(report.console, vec!["1".to_string()]);
}

#[test]
fn test_parse_error_task_fails() {
    let mut sim = Simulation::load("console.log(('x');", &Config::default());
    let report = sim.run_to_completion();

    assert!(report.completed);
    assert_eq!(report.executed.len(), 1);
    assert!(report.console.is_empty());
    assert_eq!(sim.engine().finished()[0].status, TaskStatus::Error);
    assert!(report.trace.iter().any(|e| e.kind == TraceKind::Error));
}

#[test]
fn test_empty_program_is_done_immediately() {
    let mut sim = Simulation::load("", &Config::default());
    assert!(sim.is_done());
    let report = sim.run_to_completion();
    assert_eq!(report.ticks, 0);
    assert!(report.completed);
}

#[test]
fn test_restart_readmits_program() {
    let mut sim = Simulation::load(SCENARIO, &Config::default());
    sim.run_to_completion();
    assert!(sim.is_done());

    sim.restart();
    assert_eq!(sim.ticks(), 0);
    assert_eq!(sim.engine().now_ms(), 0);
    assert_eq!(sim.engine().finished().len(), 0);

    let report = sim.run_to_completion();
    assert_eq!(report.executed.len(), 3);
    assert_eq!(report.console, vec!["a".to_string()]);
}

#[test]
fn test_run_report_serializes_camel_case() {
    let mut sim = Simulation::load(SCENARIO, &Config::default());
    let report = sim.run_to_completion();

    let json = serde_json::to_value(&report).expect("serialize");
    assert_eq!(json["finalTimeMs"], 4000);
    assert_eq!(json["executed"][0]["queue"], "callStack");
    assert_eq!(json["executed"][2]["sourceLine"], 1);
}

// ============================================================================
// Ticker
// ============================================================================

#[test]
fn test_ticker_runs_to_completion() {
    let sim = Simulation::load(SCENARIO, &config_with(1, 1.0, true));
    let (ticker, _handle) = Ticker::new(sim);

    let mut seen = Vec::new();
    let report = tokio_test::block_on(ticker.run(|tick| seen.push(tick.tick)));

    assert!(report.completed);
    assert_eq!(seen, vec![1, 2, 3, 4]);
    assert_eq!(report.console, vec!["a".to_string()]);
}

#[test]
fn test_ticker_applies_speed_changes() {
    let sim = Simulation::load("console.log(1)", &config_with(1, 1.0, true));
    let (ticker, handle) = Ticker::new(sim);
    handle.set_speed(3.0);
    handle.set_speed(0.0);
    assert_eq!(handle.current().speed, 3.0);

    let report = tokio_test::block_on(ticker.run(|_| {}));
    assert_eq!(report.ticks, 2);
    assert_eq!(report.final_time_ms, 6);
}

#[test]
fn test_ticker_stop_before_first_tick() {
    let sim = Simulation::load(SCENARIO, &config_with(1, 1.0, true));
    let (ticker, handle) = Ticker::new(sim);
    handle.stop();

    let report = tokio_test::block_on(ticker.run(|_| {}));
    assert_eq!(report.ticks, 0);
    assert!(!report.completed);
}

#[test]
fn test_ticker_waits_while_paused() {
    let sim = Simulation::load(SCENARIO, &config_with(1, 1.0, true));
    let (ticker, handle) = Ticker::new(sim);
    handle.pause();

    let started = Instant::now();
    let (report, ()) = tokio_test::block_on(async {
        tokio::join!(ticker.run(|_| {}), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            handle.resume();
        })
    });

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert!(report.completed);
}

#[test]
fn test_ticker_stops_when_paused_handle_is_dropped() {
    let sim = Simulation::load(SCENARIO, &config_with(1, 1.0, true));
    let (ticker, handle) = Ticker::new(sim);
    handle.pause();
    drop(handle);

    let report = tokio_test::block_on(ticker.run(|_| {}));
    assert_eq!(report.ticks, 0);
}
