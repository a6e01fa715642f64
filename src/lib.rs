//! At-most-once RPC over UDP.
//!
//! A [client::session::ClientSession] sends calls with a per-session sequence number and retries
//!  them until it receives the final result. The server side ([server::rpc_server::RpcServer])
//!  keeps a call table with the most recent sequence number per client, so a retransmitted
//!  request is answered from the cached result (or with an ACK while it is still running)
//!  instead of being executed a second time.

pub mod messaging;
pub mod client;
pub mod server;
pub mod util;
pub mod test_util;
