use clap::Parser;
use orgshift_cli::cli::{Cli, Commands};
use orgshift_cli::commands;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            object,
            data_dir,
            config,
            skip_reconcile,
        } => commands::run(object, &data_dir, config, skip_reconcile).await,
        Commands::Reconcile { data_dir, config } => {
            commands::reconcile(&data_dir, config).await
        }
        Commands::Export { data_dir, config } => commands::export(&data_dir, config).await,
        Commands::RewriteOwners {
            data_dir,
            config,
            emails,
            replacement,
        } => commands::rewrite_owners(&data_dir, config, &emails, &replacement).await,
        Commands::Check => commands::check().await,
    }
}
