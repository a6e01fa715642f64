use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::anyhow;
use clap::Parser;
use clap_derive::Parser;
use tracing::{error, info, Level};

use amorpc::client::client_config::RpcClientConfig;
use amorpc::client::session::ClientSession;

/// Runs a number of concurrent sessions against a server. Each session stores a value of its
///  own, reads it back, and reports PASS or FAIL.
#[derive(Parser)]
struct Args {
    #[clap(long, default_value = "127.0.0.1:8888")]
    server: SocketAddr,

    #[clap(long, default_value_t = 100)]
    num_clients: i32,

    /// Session i binds to this port plus i, and uses i as its client id. Ephemeral ports and
    ///  random client ids if omitted.
    #[clap(long)]
    base_port: Option<u16>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,
}

/// `None` if `base_port + i` is not a valid port
fn local_port(base_port: u16, i: i32) -> Option<u16> {
    u16::try_from(i).ok()
        .and_then(|offset| base_port.checked_add(offset))
}

async fn run_client(server: SocketAddr, i: i32, base_port: Option<u16>) -> anyhow::Result<bool> {
    let mut config = RpcClientConfig::new(server);
    if let Some(base_port) = base_port {
        let port = local_port(base_port, i)
            .ok_or_else(|| anyhow!("local port for client {} out of range", i))?;
        config.local_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        config.client_id = Some(i);
    }

    let mut session = ClientSession::connect(config).await?;
    let key = i;
    let value = i * 10000 + 1234;

    session.put(key, value).await?;
    tokio::time::sleep(Duration::from_secs(1)).await;
    let read = session.get(key).await?;
    session.close();

    Ok(read == value)
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .try_init()
        .ok();

    let mut handles = Vec::new();
    for i in 0..args.num_clients {
        let server = args.server;
        let base_port = args.base_port;
        handles.push((i, tokio::spawn(async move { run_client(server, i, base_port).await })));
    }

    let mut num_passed = 0;
    for (i, handle) in handles {
        match handle.await? {
            Ok(true) => {
                num_passed += 1;
                println!("PASS {}", i);
            }
            Ok(false) => println!("FAIL {}", i),
            Err(e) => {
                error!("client {} failed: {}", i, e);
                println!("FAIL {}", i);
            }
        }
    }

    info!("{} of {} clients passed", num_passed, args.num_clients);
    Ok(())
}
