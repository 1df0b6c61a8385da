use clap::Parser;
use tracing::{info, warn};

use infraguard_cli::cli::{Cli, Commands};
use infraguard_cli::commands;
use infraguard_cli::error::CliError;
use infraguard_cli::logging::init_tracing;
use infraguard_cli::output::OutputWriter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let (mut config, from_file) = commands::config::load_effective(&cli.config).await?;
    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }

    init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;
    infraguard_core::metrics::describe_all();

    if !from_file {
        warn!(path = %cli.config.display(), "config file not found, using defaults");
    }
    info!(config = %cli.config.display(), "infraguard starting");

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, &writer).await,
        Commands::List(args) => commands::list::execute(args, &writer),
        Commands::Config(args) => commands::config::execute(args, &cli.config, &writer).await,
    }
}
