use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gitscribe::types::{Repository, RepositoryKind};
use gitscribe::{Config, ConfigLoader, Store, Updater, Worker};

#[derive(Parser)]
#[command(name = "gitscribe")]
#[command(version, about = "Background worker that documents Git repositories with an LLM")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, default_value = "gitscribe.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker loop and the incremental updater
    Serve,

    /// Queue a repository for documentation
    Enqueue {
        /// Remote address (git) or local path (file)
        address: String,
        /// Repository type
        #[arg(long, default_value = "git")]
        kind: String,
        /// Branch to clone
        #[arg(long)]
        branch: Option<String>,
    },

    /// Show queue counts by status
    Status,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match ConfigLoader::load_with_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli.command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: Config) -> gitscribe::Result<()> {
    let store = Arc::new(Store::open(&config.database_path)?);

    match command {
        Commands::Serve => {
            let config = Arc::new(config);
            let cancel = CancellationToken::new();

            let worker = Worker::new(store.clone(), config.clone());
            let updater = Updater::new(store.clone(), config.clone());

            let worker_handle = {
                let cancel = cancel.clone();
                tokio::spawn(async move { worker.run(cancel).await })
            };
            let updater_handle = {
                let cancel = cancel.clone();
                tokio::spawn(async move { updater.run(cancel).await })
            };

            tokio::signal::ctrl_c().await.ok();
            info!("shutdown requested");
            cancel.cancel();
            let _ = worker_handle.await;
            let _ = updater_handle.await;
        }
        Commands::Enqueue {
            address,
            kind,
            branch,
        } => {
            let kind: RepositoryKind = kind
                .parse()
                .map_err(gitscribe::ScribeError::UnsupportedRepositoryType)?;
            let repository = Repository::pending(address, kind, branch);
            store.insert_repository(&repository)?;
            println!("queued {} ({})", repository.address, repository.id);
        }
        Commands::Status => {
            for (status, count) in store.count_by_status()? {
                println!("{:12} {}", status, count);
            }
        }
    }
    Ok(())
}
