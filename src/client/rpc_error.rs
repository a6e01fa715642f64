use std::time::Duration;

use crate::messaging::wire::{RpcRequest, RpcResponse};

/// The ways a single call can fail. The session's sequence number advances after each of them
///  (except [RpcError::SequenceExhausted], where no request is sent), so the next call never
///  collides with the failed exchange.
#[derive(thiserror::Error, Debug)]
pub enum RpcError {
    #[error("no response from server after {attempts} attempts ({elapsed:?})")]
    Timeout {
        attempts: u32,
        elapsed: Duration,
    },

    #[error("response {received:?} does not match request {expected:?}")]
    Mismatch {
        expected: RpcRequest,
        received: RpcResponse,
    },

    #[error("server refused the call with value {value}")]
    Rejected {
        value: i32,
    },

    #[error("client {client_id} has used up its sequence numbers")]
    SequenceExhausted {
        client_id: i32,
    },

    #[error(transparent)]
    Transport(#[from] anyhow::Error),
}
