//! Driving the engine through a whole program

pub mod simulation;
pub mod ticker;

#[cfg(test)]
mod tests;

pub use simulation::{ExecutedTask, RunReport, Simulation, TickReport};
pub use ticker::{Ticker, TickerControl, TickerHandle};
