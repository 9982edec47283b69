//! vcpkg-prebuild command-line entry point

mod cli;
mod commands;
mod tracing;

use ::tracing::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Commands, parse};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    if let Err(error) = run_main().await {
        eprintln!("{error:?}");
        std::process::exit(1);
    }
}

async fn run_main() -> miette::Result<()> {
    let cli = parse();

    crate::tracing::init_tracing(cli.tracing_config())?;

    execute(cli, shutdown_token()).await
}

/// Token cancelled on Ctrl+C; running steps are killed.
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Received interrupt, cancelling");
            child.cancel();
        }
    });
    token
}

async fn execute(cli: Cli, cancel: CancellationToken) -> miette::Result<()> {
    match cli.command {
        Commands::Plan { pipeline } => {
            println!("{}", commands::plan(&pipeline)?);
        }
        Commands::Run { pipeline } => {
            let count = commands::run(&pipeline, cancel).await?;
            info!(steps = count, "Pipeline complete");
        }
        Commands::Install { pipeline, curl } => {
            let root = commands::install(&pipeline, curl, cancel).await?;
            println!("{}", root.display());
        }
        Commands::Clean { pipeline } => {
            commands::clean(&pipeline, cancel).await?;
        }
        Commands::Triplet => {
            println!("{}", commands::triplet()?);
        }
    }
    Ok(())
}
