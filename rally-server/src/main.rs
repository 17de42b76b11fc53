use clap::Parser;
use rally_server::{Config, State};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();
    let db = config.open_db()?;
    let (_, server) = rally_server::bind(config.addr(), State::new(db.clone()))?;
    tokio::select! {
        result = server => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    db.flush().await?;
    Ok(())
}
