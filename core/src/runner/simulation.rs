//! Tick-driven simulation of a whole program
//!
//! Each tick is one scheduling decision cycle:
//! 1. finish the task started on the previous tick
//! 2. if the call stack is empty, admit the program's next steps up to and
//!    including the next synchronous one
//! 3. advance virtual time, releasing elapsed timers
//! 4. select and begin at most one task
//!
//! Admitting lazily keeps synchronous steps in document order even though the
//! call stack always serves its most recent admission first.

use serde::{Deserialize, Serialize};

use crate::config::{Config, TickerConfig};
use crate::engine::{Engine, Task, TaskId, TaskKind, TraceEvent};
use crate::steps::{extract_program, Extraction, QueueId, Step};

/// Task started by a tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedTask {
    pub id: TaskId,
    pub kind: TaskKind,
    pub queue: QueueId,
    pub description: String,
    pub source_line: usize,
    pub started_at_ms: u64,
}

/// What a single tick did
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub tick: u64,
    pub now_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub released: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started: Option<ExecutedTask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
}

/// Outcome of running a simulation to the end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub ticks: u64,
    /// False when the tick limit stopped the run early
    pub completed: bool,
    pub final_time_ms: u64,
    pub executed: Vec<ExecutedTask>,
    pub console: Vec<String>,
    pub trace: Vec<TraceEvent>,
}

#[derive(Debug, Clone)]
pub struct Simulation {
    engine: Engine,
    extraction: Extraction,
    ticker: TickerConfig,
    running: Option<TaskId>,
    /// Index of the next step to admit
    cursor: usize,
    ticks: u64,
    executed: Vec<ExecutedTask>,
    console: Vec<String>,
}

impl Simulation {
    /// Compile `source`; steps are admitted tick by tick
    pub fn load(source: &str, config: &Config) -> Self {
        let extraction = extract_program(source);
        let engine = Engine::with_trace_capacity(config.engine.trace_capacity);
        tracing::info!(
            steps = extraction.steps.len(),
            functions = extraction.functions.len(),
            "Loaded simulation"
        );

        Self {
            engine,
            extraction,
            ticker: config.ticker.clone(),
            running: None,
            cursor: 0,
            ticks: 0,
            executed: Vec::new(),
            console: Vec::new(),
        }
    }

    /// Run one scheduling decision cycle
    pub fn tick(&mut self) -> TickReport {
        self.ticks += 1;
        let mut report = TickReport {
            tick: self.ticks,
            ..TickReport::default()
        };

        if let Some(id) = self.running.take() {
            report.finished = Some(id);
            report.console = self.finish(id);
        }

        if self.engine.call_stack().is_empty() {
            self.admit_until_sync();
        }

        report.released = self.engine.advance_clock(self.virtual_step_ms());
        if self.ticker.fast_forward && self.engine.select_next().is_none() {
            if let Some(due) = self.engine.next_timer_due() {
                report.released.extend(self.engine.advance_clock_to(due));
            }
        }

        if let Some(id) = self.engine.select_next().map(|task| task.id) {
            if let Ok(task) = self.engine.begin_execution(id) {
                let executed = ExecutedTask {
                    id,
                    kind: task.kind,
                    queue: task.queue,
                    description: task.description,
                    source_line: task.source_line,
                    started_at_ms: self.engine.now_ms(),
                };
                self.executed.push(executed.clone());
                self.running = Some(id);
                report.started = Some(executed);
            }
        }

        report.now_ms = self.engine.now_ms();
        report
    }

    /// Admit steps in order until one lands on the call stack or none are left
    fn admit_until_sync(&mut self) {
        while let Some(step) = self.extraction.steps.get(self.cursor) {
            self.cursor += 1;
            let task = self.engine.admit(step);
            if task.queue == QueueId::CallStack {
                break;
            }
        }
    }

    /// Complete (or fail, for error steps) the task started last tick
    fn finish(&mut self, id: TaskId) -> Option<String> {
        let is_error = self
            .engine
            .task(id)
            .is_some_and(|task| task.kind == TaskKind::Error);

        if is_error {
            let message = self
                .engine
                .task(id)
                .and_then(|task| task.payload.clone())
                .unwrap_or_else(|| "parse error".to_string());
            self.engine.fail(id, &message).ok();
            return None;
        }

        let task: Task = self.engine.complete(id).ok()?;
        match (task.kind, task.payload) {
            (TaskKind::Console, Some(line)) => {
                self.console.push(line.clone());
                Some(line)
            }
            _ => None,
        }
    }

    /// Tick until nothing is left or the tick limit is reached
    pub fn run_to_completion(&mut self) -> RunReport {
        while !self.is_done() && self.ticks < self.ticker.max_ticks {
            self.tick();
        }
        let report = self.report();
        tracing::info!(
            ticks = report.ticks,
            executed = report.executed.len(),
            completed = report.completed,
            "Simulation finished"
        );
        report
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            ticks: self.ticks,
            completed: self.is_done(),
            final_time_ms: self.engine.now_ms(),
            executed: self.executed.clone(),
            console: self.console.clone(),
            trace: self.engine.trace().iter().cloned().collect(),
        }
    }

    /// Every step admitted and nothing queued, waiting or executing
    pub fn is_done(&self) -> bool {
        self.running.is_none()
            && self.cursor >= self.extraction.steps.len()
            && self.engine.is_idle()
    }

    /// Virtual milliseconds covered by one tick
    pub fn virtual_step_ms(&self) -> u64 {
        (self.ticker.interval_ms as f64 * self.ticker.speed).round() as u64
    }

    /// Change the speed multiplier; non-positive values are ignored
    pub fn set_speed(&mut self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.ticker.speed = speed;
        } else {
            tracing::warn!(speed, "Ignoring invalid speed multiplier");
        }
    }

    pub fn speed(&self) -> f64 {
        self.ticker.speed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn max_ticks(&self) -> u64 {
        self.ticker.max_ticks
    }

    pub fn interval_ms(&self) -> u64 {
        self.ticker.interval_ms
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn steps(&self) -> &[Step] {
        &self.extraction.steps
    }

    pub fn extraction(&self) -> &Extraction {
        &self.extraction
    }

    /// Clear the engine and start the program over
    pub fn restart(&mut self) {
        self.engine.reset();
        self.running = None;
        self.cursor = 0;
        self.ticks = 0;
        self.executed.clear();
        self.console.clear();
    }
}
