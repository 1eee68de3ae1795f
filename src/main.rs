use anyhow::Result;
use clap::Parser;

use mailtext::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Watch { interval } => mailtext::watch::run(interval),
        Commands::Sync => mailtext::sync::run(),
        Commands::Extract { file } => mailtext::extract::run(&file),
        Commands::Status => mailtext::sync::status(),
    }
}

/// Status lines go to stderr; `RUST_LOG` overrides the verbosity flag.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
