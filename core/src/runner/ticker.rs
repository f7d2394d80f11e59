//! Wall-clock driver for a [`Simulation`]

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use super::simulation::{RunReport, Simulation, TickReport};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerControl {
    pub paused: bool,
    pub stopped: bool,
    pub speed: f64,
}

/// Controls a running [`Ticker`] from another task
#[derive(Debug)]
pub struct TickerHandle {
    tx: watch::Sender<TickerControl>,
}

impl TickerHandle {
    pub fn pause(&self) {
        self.tx.send_modify(|control| control.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|control| control.paused = false);
    }

    /// Non-positive or non-finite speeds are ignored
    pub fn set_speed(&self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            self.tx.send_modify(|control| control.speed = speed);
        }
    }

    pub fn stop(&self) {
        self.tx.send_modify(|control| control.stopped = true);
    }

    pub fn current(&self) -> TickerControl {
        *self.tx.borrow()
    }
}

pub struct Ticker {
    simulation: Simulation,
    period: Duration,
    control: watch::Receiver<TickerControl>,
}

impl Ticker {
    /// Tick every `interval_ms` of wall time, starting at the simulation's speed
    pub fn new(simulation: Simulation) -> (Self, TickerHandle) {
        let (tx, control) = watch::channel(TickerControl {
            paused: false,
            stopped: false,
            speed: simulation.speed(),
        });
        let period = Duration::from_millis(simulation.interval_ms().max(1));

        (
            Self {
                simulation,
                period,
                control,
            },
            TickerHandle { tx },
        )
    }

    /// Tick until the program finishes, the tick limit is hit or the handle stops it
    ///
    /// If every handle is dropped while paused the run stops where it is.
    pub async fn run<F>(mut self, mut on_tick: F) -> RunReport
    where
        F: FnMut(&TickReport),
    {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.simulation.is_done() || self.simulation.ticks() >= self.simulation.max_ticks() {
                break;
            }

            let control = *self.control.borrow_and_update();
            if control.stopped {
                tracing::info!(ticks = self.simulation.ticks(), "Ticker stopped");
                break;
            }
            if control.paused {
                tracing::debug!("Ticker paused");
                if self.control.changed().await.is_err() {
                    break;
                }
                continue;
            }
            if control.speed != self.simulation.speed() {
                self.simulation.set_speed(control.speed);
            }

            interval.tick().await;
            let report = self.simulation.tick();
            on_tick(&report);
        }

        self.simulation.report()
    }
}
