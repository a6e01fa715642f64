use std::net::{Ipv4Addr, SocketAddr};
use anyhow::bail;

use crate::server::call_table::CapacityPolicy;

#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub listen_addr: SocketAddr,

    /// The call table holds one entry per client, and entries are never removed while there
    ///  is room. This bounds the table's memory.
    pub max_clients: usize,
    /// What to do with a request from a new client when the call table is full. The default
    ///  refuses the new client, which keeps every known client's deduplication state intact.
    pub capacity_policy: CapacityPolicy,
}

impl RpcServerConfig {
    pub fn new(listen_addr: SocketAddr) -> RpcServerConfig {
        RpcServerConfig {
            listen_addr,
            max_clients: 100,
            capacity_policy: CapacityPolicy::default(),
        }
    }

    /// listens on all IPv4 interfaces
    pub fn for_port(port: u16) -> RpcServerConfig {
        Self::new(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_clients == 0 {
            bail!("max_clients must be at least 1");
        }
        Ok(())
    }
}
