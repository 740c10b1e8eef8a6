use std::time::Duration;

use anyhow::Context;
use chat_relay::{RelayConfig, run_client};
use tokio::net::TcpStream;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = RelayConfig::from_env().context("invalid chat relay configuration")?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let result = runtime.block_on(async {
        let addr = config.bind_address();
        let stream = TcpStream::connect(&addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        run_client(stream, tokio::io::stdin(), tokio::io::stdout())
            .await
            .context("chat session failed")
    });

    // Stdin reads run on a blocking thread that may never return.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
