//! fixloop CLI entry point.

use anyhow::Result;
use clap::Parser;

use fixloop::cli::commands::{guard, metrics, roster, run, status, unfixable, worker};
use fixloop::cli::{handle_error, AppContext, Cli, Commands};
use fixloop::infrastructure::config::ConfigLoader;
use fixloop::infrastructure::logging::{cleanup_old_logs, LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => handle_error(err, json),
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let config = ConfigLoader::load_with(cli.config.as_deref())?;

    let log_config = LogConfig::from(&config.logging);
    let _logger = LoggerImpl::init(&log_config)?;
    if let Some(log_dir) = &log_config.log_dir {
        if let Err(e) = cleanup_old_logs(log_dir, log_config.retention_days).await {
            tracing::warn!(error = %e, "Log retention cleanup failed");
        }
    }

    match cli.command {
        Commands::Run(args) => run::execute(args, config, cli.config, cli.json).await,
        Commands::Worker(args) => worker::execute(args, config, cli.json).await.map(|()| 0),
        Commands::Guard(args) => guard::execute(args, &config, cli.json).await,
        Commands::Roster(command) => {
            let ctx = AppContext::open(config).await?;
            roster::execute(command, &ctx, cli.json).await.map(|()| 0)
        }
        Commands::Status(args) => {
            let ctx = AppContext::open(config).await?;
            status::execute(args, &ctx, cli.json).await.map(|()| 0)
        }
        Commands::Unfixable(command) => {
            let ctx = AppContext::open(config).await?;
            unfixable::execute(command, &ctx, cli.json).await.map(|()| 0)
        }
        Commands::Metrics(args) => {
            let ctx = AppContext::open(config).await?;
            metrics::execute(args, &ctx, cli.json).await.map(|()| 0)
        }
    }
}
