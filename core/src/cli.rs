use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, CONFIG_PATH_ENV};
use crate::engine::TraceEvent;
use crate::runner::{RunReport, Simulation, TickReport, Ticker};
use crate::steps::{parse_code_to_steps, Step};

#[derive(Parser)]
#[command(name = "loopviz")]
#[command(about = "Loopviz - Step through a script's event loop", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the steps extracted from a script
    Steps {
        /// Script file, or - for stdin
        file: String,

        /// Print steps as JSON
        #[arg(long)]
        json: bool,
    },

    /// Simulate a script and print its trace and console output
    Run {
        /// Script file, or - for stdin
        file: String,

        /// Speed multiplier (overrides config)
        #[arg(long)]
        speed: Option<f64>,

        /// Tick interval in milliseconds (overrides config)
        #[arg(long)]
        interval_ms: Option<u64>,

        /// Tick on the wall clock instead of as fast as possible
        #[arg(long)]
        realtime: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    if let Some(config_path) = &cli.config {
        std::env::set_var(CONFIG_PATH_ENV, config_path);
    }

    let mut config = Config::load()?;
    init_tracing(&config.logging.level);

    match cli.command {
        Commands::Steps { file, json } => {
            let source = read_source(&file)?;
            let steps = parse_code_to_steps(&source);
            if json {
                println!("{}", serde_json::to_string_pretty(&steps)?);
            } else if steps.is_empty() {
                println!("No steps");
            } else {
                for step in &steps {
                    println!("{}", format_step(step));
                }
            }
        }

        Commands::Run {
            file,
            speed,
            interval_ms,
            realtime,
            json,
        } => {
            if let Some(speed) = speed {
                config.ticker.speed = speed;
            }
            if let Some(interval_ms) = interval_ms {
                config.ticker.interval_ms = interval_ms;
            }
            config.validate()?;

            let source = read_source(&file)?;
            let mut simulation = Simulation::load(&source, &config);

            let report = if realtime {
                run_realtime(simulation, json).await
            } else {
                simulation.run_to_completion()
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report, !realtime);
            }
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

/// Install the stderr subscriber; `RUST_LOG` wins over the configured level
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Already installed when the CLI runs more than once in a process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn read_source(file: &str) -> Result<String> {
    if file == "-" {
        let mut source = String::new();
        std::io::stdin()
            .read_to_string(&mut source)
            .context("Failed to read script from stdin")?;
        return Ok(source);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read script {}", file))
}

async fn run_realtime(simulation: Simulation, quiet: bool) -> RunReport {
    let (ticker, handle) = Ticker::new(simulation);
    let stopper = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let report = ticker
        .run(|tick| {
            if !quiet {
                print_tick(tick);
            }
        })
        .await;
    stopper.abort();
    report
}

fn format_step(step: &Step) -> String {
    let action = format!("{:?}", step.action);
    let mut line = format!(
        "{:>4} | {:<13} | {:<19} | {}",
        step.source_line,
        step.target_queue.as_str(),
        action,
        step.description
    );
    if step.delay_ms > 0 {
        line.push_str(&format!(" [{}ms]", step.delay_ms));
    }
    line
}

fn format_event(event: &TraceEvent) -> String {
    let task = event
        .task_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "-".to_string());
    let kind = format!("{:?}", event.kind);
    format!(
        "{:>6}ms {:<5} {:<12} {}",
        event.at_ms, task, kind, event.message
    )
}

fn print_tick(tick: &TickReport) {
    if let Some(started) = &tick.started {
        println!(
            "[tick {} @ {}ms] {} {} ({})",
            tick.tick, tick.now_ms, started.id, started.description, started.queue
        );
    }
    if let Some(line) = &tick.console {
        println!("  > {}", line);
    }
}

fn print_report(report: &RunReport, with_trace: bool) {
    if with_trace {
        println!("Trace:");
        for event in &report.trace {
            println!("  {}", format_event(event));
        }
        println!();
    }

    println!("Console:");
    if report.console.is_empty() {
        println!("  (no output)");
    }
    for line in &report.console {
        println!("  {}", line);
    }

    println!();
    println!(
        "{} task(s) executed in {} tick(s), virtual time {}ms",
        report.executed.len(),
        report.ticks,
        report.final_time_ms
    );
    if !report.completed {
        println!("Stopped before completion (tick limit or interrupt)");
    }
}
