use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::messaging::transport::{Datagram, Transport};
use crate::util::random::{Random, RngRandom};

/// Probabilities (between 0.0 and 1.0) for the faults a [LossyTransport] injects
#[derive(Clone, Debug, Default)]
pub struct LossConfig {
    pub send_loss_rate: f64,
    pub send_duplicate_rate: f64,
    pub receive_loss_rate: f64,
}

/// A decorator that makes an underlying transport drop and duplicate datagrams, for exercising
///  retries and deduplication against a real socket.
pub struct LossyTransport<R: Random = RngRandom> {
    inner: Arc<dyn Transport>,
    config: LossConfig,
    _random: PhantomData<fn() -> R>,
}
impl LossyTransport {
    pub fn new(inner: Arc<dyn Transport>, config: LossConfig) -> LossyTransport {
        Self::new_with_random(inner, config)
    }
}
impl<R: Random> LossyTransport<R> {
    pub fn new_with_random(inner: Arc<dyn Transport>, config: LossConfig) -> LossyTransport<R> {
        LossyTransport {
            inner,
            config,
            _random: Default::default(),
        }
    }

    fn drop_received(&self, datagram: &Datagram) -> bool {
        if R::chance(self.config.receive_loss_rate) {
            debug!("simulated loss: dropping datagram received from {:?}", datagram.from);
            return true;
        }
        false
    }
}

#[async_trait]
impl<R: Random + 'static> Transport for LossyTransport<R> {
    async fn send(&self, to: SocketAddr, buf: &[u8]) -> anyhow::Result<()> {
        if R::chance(self.config.send_loss_rate) {
            debug!("simulated loss: dropping datagram to {:?}", to);
            return Ok(());
        }

        self.inner.send(to, buf).await?;
        if R::chance(self.config.send_duplicate_rate) {
            debug!("simulated duplication: sending datagram to {:?} twice", to);
            self.inner.send(to, buf).await?;
        }
        Ok(())
    }

    async fn recv(&self) -> anyhow::Result<Datagram> {
        loop {
            let datagram = self.inner.recv().await?;
            if !self.drop_received(&datagram) {
                return Ok(datagram);
            }
        }
    }

    async fn recv_timeout(&self, timeout: Duration) -> anyhow::Result<Option<Datagram>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inner.recv_timeout(remaining).await? {
                None => return Ok(None),
                Some(datagram) => {
                    if !self.drop_received(&datagram) {
                        return Ok(Some(datagram));
                    }
                }
            }
        }
    }

    fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        self.inner.local_addr()
    }
}
