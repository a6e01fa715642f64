pub mod udp;
pub mod lossy;

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
#[cfg(test)] use mockall::automock;

/// Datagrams are read into a buffer of this size. Both record types are far smaller, so a
///  datagram that fills the buffer is malformed anyway and truncation does not matter.
pub const MAX_DATAGRAM_SIZE: usize = 512;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Datagram {
    pub from: SocketAddr,
    pub payload: Bytes,
}

/// This trait decouples the RPC logic on both client and server side from the datagram socket,
///  mainly to allow testing the retry and deduplication logic without actual network I/O.
///
/// Implementations give no delivery guarantees: datagrams may be lost, duplicated or reordered.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Sync + Send + 'static {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()>;

    /// waits for the next datagram without a time limit
    async fn recv(&self) -> anyhow::Result<Datagram>;

    /// returns `None` if no datagram arrived within `timeout`
    async fn recv_timeout(&self, timeout: Duration) -> anyhow::Result<Option<Datagram>>;

    fn local_addr(&self) -> anyhow::Result<SocketAddr>;
}
