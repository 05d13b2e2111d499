use clap::Parser;
use merchant_console::config::AppConfig;
use merchant_console::start_server;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "merchant-console", about = "Merchant administration console backend")]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let server_task = tokio::spawn(start_server(config, shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested, stopping server");
    let _ = shutdown_tx.send(());

    server_task.await??;
    Ok(())
}
