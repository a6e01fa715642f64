use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::messaging::transport::{Datagram, Transport};
use crate::messaging::wire::RpcResponse;

/// A [Transport] that records everything sent through it instead of sending it. It never
///  receives anything.
pub struct TrackingTransport {
    myself: SocketAddr,
    tracker: Arc<RwLock<Vec<(SocketAddr, Vec<u8>)>>>,
}
impl TrackingTransport {
    pub fn new(myself: SocketAddr) -> Self {
        TrackingTransport {
            myself,
            tracker: Default::default(),
        }
    }

    /// returns sent datagrams, clearing the internal buffer
    pub async fn sent_datagrams(&self) -> Vec<(SocketAddr, Vec<u8>)> {
        let mut lock = self.tracker.write().await;
        std::mem::take(&mut *lock)
    }

    /// returns sent datagrams decoded as responses, clearing the internal buffer
    pub async fn sent_responses(&self) -> Vec<(SocketAddr, RpcResponse)> {
        self.sent_datagrams().await
            .into_iter()
            .map(|(to, buf)| {
                let response = RpcResponse::try_deser(&buf)
                    .unwrap_or_else(|e| panic!("sent datagram is not a response: {}", e));
                (to, response)
            })
            .collect()
    }
}

#[async_trait]
impl Transport for TrackingTransport {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        self.tracker.write().await.push((to, buf.to_vec()));
        Ok(())
    }

    async fn recv(&self) -> anyhow::Result<Datagram> {
        std::future::pending().await
    }

    async fn recv_timeout(&self, timeout: Duration) -> anyhow::Result<Option<Datagram>> {
        tokio::time::sleep(timeout).await;
        Ok(None)
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.myself)
    }
}
