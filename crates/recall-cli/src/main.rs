//! CLI entry point.
//!
//! Parses arguments, wires the engine through [`bootstrap`] and dispatches
//! to the command handlers.

use clap::Parser;

use recall_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers, logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = CliConfig::from_cli(&cli)?;
    match cli.command {
        Commands::Play { texts } => {
            let ctx = bootstrap(config)?;
            let result = handlers::play::execute(&ctx, &texts).await;
            ctx.shutdown().await;
            result
        }
        Commands::Warm { texts } => handlers::warm::execute(&config, &texts).await,
        Commands::Formats => handlers::formats::execute(&config),
    }
}
