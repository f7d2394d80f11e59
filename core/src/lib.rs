pub mod cli;
pub mod config;
pub mod engine;
pub mod parser;
pub mod runner;
pub mod steps;
pub mod types;

// Re-export the main entry points
pub use crate::config::Config;
pub use crate::engine::{Engine, Task, TaskId, TaskStatus};
pub use crate::parser::{parse_program, ParseError};
pub use crate::runner::{RunReport, Simulation, Ticker, TickerHandle};
pub use crate::steps::{parse_code_to_steps, QueueId, Step};
