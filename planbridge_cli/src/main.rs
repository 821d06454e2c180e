use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};
use commands::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "warn",
        1 => "planbridge_core=debug,planbridge_cli=debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match &cli.command {
        Commands::Login { no_wait } => auth::login(&cli, *no_wait).await,
        Commands::Logout => auth::logout(&cli).await,
        Commands::Status => auth::status(&cli).await,
        Commands::Config { action } => config::run(&cli, action.clone()).await,
        Commands::Tools { connector } => tools::run(&cli, connector.as_deref()).await,
        Commands::Call { tool, args } => call::run(&cli, tool, args.as_deref()).await,
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }
}
