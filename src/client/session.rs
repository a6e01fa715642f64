use std::fmt::{Debug, Formatter};
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::client::client_config::RpcClientConfig;
use crate::client::rpc_error::RpcError;
use crate::messaging::transport::udp::UdpTransport;
use crate::messaging::transport::Transport;
use crate::messaging::wire::{CallType, ResponseType, RpcRequest, RpcResponse};
use crate::util::random::{Random, RngRandom};

/// The client side of the protocol: one session talks to one server through its own socket,
///  tagging every call with the session's client id and a sequence number.
///
/// A call is retransmitted until a final answer arrives, so the server may see it several
///  times. The sequence number is what lets the server recognize these retransmissions and
///  execute the call only once. It advances after every call, whatever the outcome, and is
///  never reused.
///
/// Calls take `&mut self`: a session has at most one outstanding call. Concurrent callers need
///  a session each.
pub struct ClientSession {
    client_id: i32,
    next_sequence_number: i32,
    server_addr: SocketAddr,
    transport: Arc<dyn Transport>,
    config: RpcClientConfig,
}
impl Debug for ClientSession {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClientSession{{client_id:{}, next_seq:{}, server:{:?}}}", self.client_id, self.next_sequence_number, self.server_addr)
    }
}

impl ClientSession {
    /// Binds a UDP socket to the configured local address and creates a session on it
    pub async fn connect(config: RpcClientConfig) -> anyhow::Result<ClientSession> {
        config.validate()?;
        let transport = Arc::new(UdpTransport::bind(config.local_addr).await?);
        Ok(Self::new(config, transport))
    }

    pub fn new(config: RpcClientConfig, transport: Arc<dyn Transport>) -> ClientSession {
        let client_id = config.client_id
            .unwrap_or_else(RngRandom::next_client_id);
        debug!(client_id, server = ?config.server_addr, "new RPC session");

        ClientSession {
            client_id,
            next_sequence_number: 1,
            server_addr: config.server_addr,
            transport,
            config,
        }
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub fn next_sequence_number(&self) -> i32 {
        self.next_sequence_number
    }

    pub async fn put(&mut self, key: i32, value: i32) -> Result<i32, RpcError> {
        self.call(CallType::Put, key, value).await
    }

    pub async fn get(&mut self, key: i32) -> Result<i32, RpcError> {
        self.call(CallType::Get, key, 0).await
    }

    /// asks the server to do nothing for the given number of seconds
    pub async fn idle(&mut self, seconds: i32) -> Result<i32, RpcError> {
        self.call(CallType::Idle, seconds, 0).await
    }

    /// Fails with [RpcError::SequenceExhausted] without sending anything once the session has
    ///  used up its sequence numbers: wrapping around would make every later call look stale
    ///  to the server.
    pub async fn call(&mut self, call_type: CallType, arg1: i32, arg2: i32) -> Result<i32, RpcError> {
        let following_sequence_number = self.next_sequence_number.checked_add(1)
            .ok_or(RpcError::SequenceExhausted { client_id: self.client_id })?;

        let request = RpcRequest {
            call_type,
            sequence_number: self.next_sequence_number,
            client_id: self.client_id,
            arg1,
            arg2,
        };

        let result = self.do_call(&request).await;
        self.next_sequence_number = following_sequence_number;
        result
    }

    /// Releases the session's socket
    pub fn close(self) {
        debug!(client_id = self.client_id, "closing RPC session");
    }

    async fn do_call(&self, request: &RpcRequest) -> Result<i32, RpcError> {
        trace!("RPC call {:?}", request);

        let buf = request.to_bytes();
        let started = Instant::now();

        let mut attempts = 0;
        loop {
            if attempts >= self.config.max_attempts {
                warn!(client_id = self.client_id, seq = request.sequence_number, "no response after {} attempts", attempts);
                return Err(RpcError::Timeout { attempts, elapsed: started.elapsed() });
            }
            attempts += 1;

            self.transport.send(self.server_addr, &buf).await?;

            let response = match self.recv_response().await? {
                Some(response) => response,
                None => {
                    debug!(client_id = self.client_id, seq = request.sequence_number, "no response within {:?} - attempt {} of {}", self.config.response_timeout, attempts, self.config.max_attempts);
                    continue;
                }
            };

            if !response.matches(request) {
                warn!("response params did not match request: {:?} for {:?}", response, request);
                return Err(RpcError::Mismatch { expected: *request, received: response });
            }

            match response.response_type {
                ResponseType::Value => {
                    trace!("received VALUE {} for {:?}", response.value, request);
                    return Ok(response.value);
                }
                ResponseType::Error => {
                    warn!("server refused {:?}", request);
                    return Err(RpcError::Rejected { value: response.value });
                }
                ResponseType::Ack => {
                    if let Some(max_call_duration) = self.config.max_call_duration {
                        if started.elapsed() >= max_call_duration {
                            warn!(client_id = self.client_id, seq = request.sequence_number, "call still in progress after {:?} - giving up", max_call_duration);
                            return Err(RpcError::Timeout { attempts, elapsed: started.elapsed() });
                        }
                    }

                    trace!("received ACK for {:?} - call in progress", request);
                    attempts = 0;
                    tokio::time::sleep(self.config.ack_retry_delay).await;
                }
            }
        }
    }

    /// Waits up to the response timeout for a datagram from the server that is a well-formed
    ///  response. Anything else is discarded without ending the wait.
    async fn recv_response(&self) -> anyhow::Result<Option<RpcResponse>> {
        let deadline = Instant::now() + self.config.response_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let datagram = match self.transport.recv_timeout(remaining).await? {
                Some(datagram) => datagram,
                None => return Ok(None),
            };

            if datagram.from != self.server_addr {
                debug!("discarding datagram from {:?}, expected server {:?}", datagram.from, self.server_addr);
                continue;
            }

            match RpcResponse::try_deser(&datagram.payload) {
                Ok(response) => return Ok(Some(response)),
                Err(e) => debug!("discarding malformed response: {}", e),
            }
        }
    }
}
