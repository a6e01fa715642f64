use std::sync::Arc;

use clap::Parser;
use clap_derive::Parser;
use tracing::Level;

use amorpc::server::rpc_server::RpcServer;
use amorpc::server::server_config::RpcServerConfig;
use amorpc::server::store::InMemoryStore;

#[derive(Parser)]
struct Args {
    #[clap(default_value_t = 8888)]
    port: u16,

    #[clap(long, default_value_t = 100)]
    max_clients: usize,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_thread_ids(true)
        .try_init()
        .ok();

    let mut config = RpcServerConfig::for_port(args.port);
    config.max_clients = args.max_clients;

    let server = RpcServer::new(config, Arc::new(InMemoryStore::new())).await?;
    server.run().await;
    Ok(())
}
