//! Stated CLI entry point.

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use stated_cli::cli::{Cli, Commands};
use stated_cli::commands;
use stated_cli::repl::Repl;

fn main() {
    // Load .env.local if it exists (for STATED_STATE_DIR, RUST_LOG)
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level().to_string()));

    fmt().with_env_filter(filter).with_target(false).init();

    // Get state directory
    let state_dir = cli.state_dir();

    // Handle command or enter REPL
    let result = match cli.command {
        Some(Commands::Repl) | None => run_repl(&state_dir),
        Some(cmd) => commands::execute(cmd, &state_dir),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_repl(state_dir: &std::path::Path) -> commands::Result<()> {
    let mut repl = Repl::new(state_dir)?;
    repl.run()
}
