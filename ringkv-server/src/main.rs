mod config;
mod server;

use anyhow::Context;
use clap::Parser;
use crate::config::Settings;
use crate::server::{ServerOptions, run_server};
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "ringkv")]
#[command(about = "One node of a Dynamo-style replicated key-value ring")]
struct Cli {
    /// Node name; its settings are read from `<config-dir>/<name>.json`
    name: String,

    /// Host the membership table for the ring
    #[arg(long)]
    leader: bool,

    /// Directory holding one descriptor per ring member
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ringkv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    if let Err(error) = start(cli).await {
        tracing::error!("{:#}", error);
        std::process::exit(1);
    }
}

async fn start(cli: Cli) -> anyhow::Result<()> {
    tracing::info!(
        "Starting ringkv node {} with config dir {}",
        cli.name,
        cli.config_dir.display()
    );

    let settings = Settings::load(&cli.config_dir, &cli.name)
        .with_context(|| format!("failed to load settings for node {}", cli.name))?;

    tracing::info!(
        "Node: {}, Bind: {}, Partitions: {}, Fanout: {:?}, Leader: {}",
        cli.name,
        settings.bind_address(),
        settings.partitions,
        settings.fanout,
        cli.leader
    );

    run_server(ServerOptions {
        name: cli.name,
        config_dir: cli.config_dir,
        leader: cli.leader,
        settings,
    })
    .await
    .context("server error")?;

    Ok(())
}
