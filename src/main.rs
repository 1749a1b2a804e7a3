// condtrace: branch-condition extraction and line coverage for Java methods
//
// Extracts the conditions guarding each branch target, substitutes locals
// back to input parameters, runs concrete inputs under a timeout and explains
// which conditions an input fails.

use anyhow::Result;
use clap::Parser;

use condtrace::cli::{self, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    // Run the appropriate command
    run_command(cli)?;

    Ok(())
}

fn run_command(cli: Cli) -> Result<()> {
    match cli.command.clone() {
        Commands::Paths(args) => cli::cmds::paths(args, &cli)?,
        Commands::Bindings(args) => cli::cmds::bindings(args, &cli)?,
        Commands::Run(args) => cli::cmds::run(args, &cli)?,
        Commands::Explain(args) => cli::cmds::explain(args, &cli)?,
    }
    Ok(())
}
