use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::messaging::transport::udp::UdpTransport;
use crate::messaging::transport::Transport;
use crate::server::call_table::CallTable;
use crate::server::dispatcher::RequestDispatcher;
use crate::server::executor::OperationExecutor;
use crate::server::server_config::RpcServerConfig;
use crate::server::store::KeyValueStore;

/// Wires a transport, the call table and an executor together into a running server.
pub struct RpcServer {
    config: RpcServerConfig,
    local_addr: SocketAddr,
    call_table: Arc<CallTable>,
    dispatcher: RequestDispatcher,
    cancel_sender: broadcast::Sender<()>,
}
impl RpcServer {
    pub async fn new(config: RpcServerConfig, store: Arc<dyn KeyValueStore>) -> anyhow::Result<RpcServer> {
        config.validate()?;
        let transport = Arc::new(UdpTransport::bind(config.listen_addr).await?);
        Self::new_with_transport(config, transport, store)
    }

    pub fn new_with_transport(config: RpcServerConfig, transport: Arc<dyn Transport>, store: Arc<dyn KeyValueStore>) -> anyhow::Result<RpcServer> {
        config.validate()?;

        let local_addr = transport.local_addr()?;
        let call_table = Arc::new(CallTable::new(config.max_clients, config.capacity_policy));
        let executor = Arc::new(OperationExecutor::new(store));
        let dispatcher = RequestDispatcher::new(transport, call_table.clone(), executor);
        let (cancel_sender, _) = broadcast::channel(1);

        Ok(RpcServer {
            config,
            local_addr,
            call_table,
            dispatcher,
            cancel_sender,
        })
    }

    /// the address the server actually listens on, with the ephemeral port resolved
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn call_table(&self) -> &Arc<CallTable> {
        &self.call_table
    }

    /// Serves requests until [RpcServer::shut_down] is called. Calls that are still executing
    ///  at that point are not waited for.
    pub async fn run(&self) {
        info!(max_clients = self.config.max_clients, "RPC server listening on {:?}", self.local_addr);
        let cancel_receiver = self.cancel_sender.subscribe();
        self.dispatcher.recv_loop(cancel_receiver).await;
        info!("RPC server stopped");
    }

    /// Stops a running [RpcServer::run]. This has no effect on a server that is not running yet.
    pub fn shut_down(&self) {
        if let Err(err) = self.cancel_sender.send(()) {
            warn!(?err, "error shutting down RPC server - was it running?");
        }
    }
}


#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::client::client_config::RpcClientConfig;
    use crate::client::session::ClientSession;
    use crate::messaging::wire::{CallType, RpcRequest, RpcResponse};
    use crate::server::call_table::CapacityPolicy;
    use crate::server::store::{InMemoryStore, MockKeyValueStore};
    use crate::test_util::transport::TrackingTransport;
    use super::*;

    fn localhost() -> SocketAddr {
        SocketAddr::from_str("127.0.0.1:0").unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let mut config = RpcServerConfig::new(localhost());
        config.max_clients = 0;
        assert!(RpcServer::new(config, Arc::new(InMemoryStore::new())).await.is_err());
    }

    #[tokio::test]
    async fn test_new_with_transport() {
        let addr = SocketAddr::from_str("127.0.0.1:8888").unwrap();
        let mut config = RpcServerConfig::new(addr);
        config.max_clients = 3;
        config.capacity_policy = CapacityPolicy::Reject;

        let server = RpcServer::new_with_transport(config, Arc::new(TrackingTransport::new(addr)), Arc::new(InMemoryStore::new())).unwrap();
        assert_eq!(server.local_addr(), addr);
        assert_eq!(server.call_table().capacity(), 3);
        assert!(server.call_table().is_empty().await);
    }

    #[tokio::test]
    async fn test_full_table_keeps_known_clients_deduplicated_by_default() {
        let addr = SocketAddr::from_str("127.0.0.1:8888").unwrap();
        let mut config = RpcServerConfig::new(addr);
        config.max_clients = 1;

        let num_puts = Arc::new(AtomicUsize::new(0));
        let mut store = MockKeyValueStore::new();
        store.expect_put()
            .returning({
                let num_puts = num_puts.clone();
                move |_, v| {
                    num_puts.fetch_add(1, Ordering::AcqRel);
                    v
                }
            });

        let server = RpcServer::new_with_transport(config, Arc::new(TrackingTransport::new(addr)), Arc::new(store)).unwrap();

        let first = RpcRequest { call_type: CallType::Put, sequence_number: 1, client_id: 1, arg1: 7, arg2: 99 };
        server.dispatcher.handle_request(first).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(server.dispatcher.handle_request(first).await, Some(RpcResponse::value(&first, 99)));

        let other_client = RpcRequest { client_id: 2, ..first };
        assert_eq!(server.dispatcher.handle_request(other_client).await, Some(RpcResponse::error(&other_client)));

        // a late retransmission of client 1's completed call is answered from the cache
        assert_eq!(server.dispatcher.handle_request(first).await, Some(RpcResponse::value(&first, 99)));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(num_puts.load(Ordering::Acquire), 1);
        assert!(server.call_table().find(1).await.is_some());
        assert!(server.call_table().find(2).await.is_none());
    }

    #[tokio::test]
    async fn test_shut_down() {
        let addr = SocketAddr::from_str("127.0.0.1:8888").unwrap();
        let server = Arc::new(RpcServer::new_with_transport(
            RpcServerConfig::new(addr),
            Arc::new(TrackingTransport::new(addr)),
            Arc::new(InMemoryStore::new())
        ).unwrap());

        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });
        while server.cancel_sender.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        server.shut_down();
        tokio::time::timeout(Duration::from_secs(5), handle).await
            .expect("server did not shut down")
            .unwrap();
    }

    #[tokio::test]
    async fn test_serve_session_over_udp() {
        let server = Arc::new(RpcServer::new(RpcServerConfig::new(localhost()), Arc::new(InMemoryStore::new())).await.unwrap());
        let handle = tokio::spawn({
            let server = server.clone();
            async move { server.run().await }
        });

        let mut config = RpcClientConfig::new(server.local_addr());
        config.response_timeout = Duration::from_millis(200);
        let mut session = ClientSession::connect(config).await.unwrap();

        assert_eq!(session.put(7, 99).await.unwrap(), 99);
        assert_eq!(session.get(7).await.unwrap(), 99);
        assert_eq!(session.get(8).await.unwrap(), 0);
        assert_eq!(server.call_table().len().await, 1);

        server.shut_down();
        handle.await.unwrap();
    }
}
