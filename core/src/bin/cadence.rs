/// Cadence CLI
///
/// Runs routes, functions, commands and tests of a module handed over as a
/// JSON AST document.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cadence_core::cli::{self, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run(cli.command, config).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
