use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::net::UdpSocket;
use tracing::{info, trace};

use crate::messaging::transport::{Datagram, Transport, MAX_DATAGRAM_SIZE};

/// [Transport] on a single tokio [UdpSocket], used both for sending and receiving. A client
///  session owns one of these, and the server uses a single one for all clients.
pub struct UdpTransport {
    socket: UdpSocket,
}
impl UdpTransport {
    /// Binds to the given address - port 0 picks an ephemeral port
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<UdpTransport> {
        let socket = UdpSocket::bind(addr).await?;
        info!("bound UDP socket to {:?}", socket.local_addr()?);
        Ok(UdpTransport { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        trace!("UDP socket: sending {} bytes to {:?}", buf.len(), to);
        self.socket.send_to(buf, to).await?;
        Ok(())
    }

    async fn recv(&self) -> anyhow::Result<Datagram> {
        let mut buf = BytesMut::zeroed(MAX_DATAGRAM_SIZE);
        let (len, from) = self.socket.recv_from(buf.as_mut()).await?;
        buf.truncate(len);
        trace!("UDP socket: received {} bytes from {:?}", len, from);

        Ok(Datagram {
            from,
            payload: buf.freeze(),
        })
    }

    async fn recv_timeout(&self, timeout: Duration) -> anyhow::Result<Option<Datagram>> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(received) => received.map(Some),
            Err(_) => Ok(None),
        }
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
