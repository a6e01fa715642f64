use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use anyhow::bail;

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub server_addr: SocketAddr,
    /// the address the session's socket binds to, port 0 for an ephemeral port
    pub local_addr: SocketAddr,

    /// `None` picks a random non-negative id. Two sessions using the same id against the same
    ///  server interfere with each other's deduplication state.
    pub client_id: Option<i32>,

    /// number of sends without any response before a call fails with a timeout. An ACK from
    ///  the server resets the count.
    pub max_attempts: u32,
    /// time to wait for a response after each send
    pub response_timeout: Duration,
    /// pause after an ACK before asking again
    pub ack_retry_delay: Duration,
    /// Upper bound for the total duration of a single call. Since every ACK resets the attempt
    ///  count, a server that keeps acknowledging a call without ever completing it would
    ///  otherwise keep the caller waiting indefinitely.
    pub max_call_duration: Option<Duration>,
}

impl RpcClientConfig {
    pub fn new(server_addr: SocketAddr) -> RpcClientConfig {
        let local_addr = if server_addr.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        }
        else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };

        RpcClientConfig {
            server_addr,
            local_addr,
            client_id: None,
            max_attempts: 5,
            response_timeout: Duration::from_secs(1),
            ack_retry_delay: Duration::from_secs(1),
            max_call_duration: None,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_attempts == 0 {
            bail!("max_attempts must be at least 1");
        }
        if self.response_timeout.is_zero() {
            bail!("response_timeout must not be zero");
        }
        if self.server_addr.port() == 0 {
            bail!("server address {:?} has no port", self.server_addr);
        }
        Ok(())
    }
}
