/// Loopviz CLI
///
/// Extracts event-loop steps from a script and simulates their scheduling.

use loopviz_core::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
