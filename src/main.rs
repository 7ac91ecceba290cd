use anyhow::Result;
use clap::Parser;

use copytrade::application::commands::{load_config, run_status, Cli, Commands};
use copytrade::logging::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional; real environment variables take precedence.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let config = load_config(&cli.overrides)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            setup_logging(&config.logging.level, config.logging.json);
            if let Err(e) = copytrade::app::run(config).await {
                tracing::error!(
                    error = %copytrade::shared::utils::format_error_chain(&e),
                    "copytrade stopped"
                );
                return Err(e);
            }
            Ok(())
        }
        Commands::Status { trade_id, json } => run_status(&config, &trade_id, json),
    }
}
