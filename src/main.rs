use anyhow::Context;
use chat_relay::{ChatRelay, RelayConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = RelayConfig::from_env().context("invalid chat relay configuration")?;
    info!(
        cores = num_cpus::get(),
        workers = config.workers,
        "starting chat relay"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: RelayConfig) -> anyhow::Result<()> {
    let mut relay = ChatRelay::new();
    if let Some(acceptor) = config
        .tls_acceptor()
        .context("failed to load TLS identity")?
    {
        relay = relay.with_tls(acceptor);
    }

    let listener = ChatRelay::bind(&config.bind_address()).await?;

    relay.run_until(listener, shutdown_signal()).await;
    info!("chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            error!(error = %err, "cannot listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
