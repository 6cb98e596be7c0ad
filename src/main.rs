//! birdeval - execution-accuracy evaluation for text-to-SQL predictions.

use birdeval::cli::{Cli, Command};
use birdeval::config::Config;
use birdeval::db::DriverConnector;
use birdeval::error::Result;
use birdeval::eval::run_evaluation;
use birdeval::logging::init_logging;
use birdeval::split::split_dataset;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.verbose);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping all tasks");
            interrupt.cancel();
        }
    });

    if let Err(e) = run(cli, cancel).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli, cancel: CancellationToken) -> Result<()> {
    let config_path = cli.config_path();

    match cli.command {
        Command::Evaluate(args) => {
            info!("Loading config from: {}", config_path.display());
            let config = Config::load_from_file(&config_path)?;
            let settings = args.resolve(&config)?;

            if let Some(server) = &settings.server {
                info!("Connection: {}", server.display_string(settings.dialect));
            }
            run_evaluation(&settings, Arc::new(DriverConnector), cancel).await?;
        }
        Command::Split(args) => {
            let summary = split_dataset(&args.to_options())?;
            if summary.skipped_lines > 0 {
                warn!("Skipped {} lines without a database id", summary.skipped_lines);
            }
        }
    }

    Ok(())
}
