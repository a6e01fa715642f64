use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::messaging::wire::{CallType, RpcRequest, RpcResponse};
use crate::server::call_table::CallTableEntry;
use crate::server::store::KeyValueStore;

/// Runs admitted calls against the store. Each call runs as a detached task, and its only
///  observable effect apart from the store operation is recording the result in the client's
///  call table entry.
pub struct OperationExecutor {
    store: Arc<dyn KeyValueStore>,
}
impl OperationExecutor {
    pub fn new(store: Arc<dyn KeyValueStore>) -> OperationExecutor {
        OperationExecutor { store }
    }

    pub async fn execute(&self, request: &RpcRequest) -> i32 {
        match request.call_type {
            CallType::Idle => {
                self.store.idle(request.arg1).await;
                0
            }
            CallType::Get => self.store.get(request.arg1).await,
            CallType::Put => self.store.put(request.arg1, request.arg2).await,
            CallType::Unknown(n) => {
                warn!(client_id = request.client_id, "invalid call type {}", n);
                RpcResponse::ERROR_VALUE
            }
        }
    }

    /// Executes the call and stores the result in the entry. The caller must have marked the
    ///  entry as executing for this request's sequence number.
    pub async fn execute_and_record(&self, request: RpcRequest, entry: Arc<CallTableEntry>) {
        let result = self.execute(&request).await;

        let mut state = entry.lock().await;
        state.executing = false;
        if state.last_sequence_number == request.sequence_number {
            trace!("{:?} completed with result {}", request, result);
            state.result = result;
            state.completed = true;
        }
        else {
            debug!("{:?} completed after entry moved on to sequence number {} - discarding result", request, state.last_sequence_number);
        }
    }

    /// Starts executing the call without waiting for it. The returned handle is only needed by
    ///  code that wants to wait for the result, the dispatcher drops it.
    pub fn spawn(self: &Arc<Self>, request: RpcRequest, entry: Arc<CallTableEntry>) -> JoinHandle<()> {
        let executor = self.clone();
        tokio::spawn(async move {
            executor.execute_and_record(request, entry).await;
        })
    }
}
