use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::{Server, ServerResult};

#[tokio::main]
async fn main() -> ServerResult<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();

    info!("Starting arena server...");
    info!(
        "Tick rate {}Hz, snapshots every {} ticks, up to {} clients",
        config.tick_rate,
        config.ticks_per_broadcast(),
        config.max_clients
    );

    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
