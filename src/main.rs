use bedrock_switch_proxy::{config::Config, proxy};
use clap::Parser;
use mimalloc::MiMalloc;
use std::sync::Arc;
use tokio::net::TcpListener;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(false)
        .init();

    let context = Arc::new(config.build_context()?);
    let listener = TcpListener::bind(config.bind).await?;
    tracing::info!("Listening on {}", config.bind);

    proxy::run(listener, context).await
}
