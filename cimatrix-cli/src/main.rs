// cimatrix
// Expand and run Travis-style build matrices locally

mod commands;
mod output;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use commands::expand::ExpandArgs;
use commands::run::RunArgs;
use commands::validate::ValidateArgs;

#[derive(Parser, Debug)]
#[command(name = "cimatrix", version)]
#[command(about = "Expand and run Travis-style build matrices locally")]
struct Cli {
    /// Show debug logging (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Expand the matrix and run every job
    Run(RunArgs),
    /// Print the expanded job list
    Expand(ExpandArgs),
    /// Parse, validate and expand a configuration
    Validate(ValidateArgs),
}

/// Install the fmt subscriber; `RUST_LOG` wins over `--verbose`
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Expand(args) => commands::expand::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}
