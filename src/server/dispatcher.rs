use std::sync::Arc;

use tokio::select;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::messaging::transport::{Datagram, Transport};
use crate::messaging::wire::{RpcRequest, RpcResponse};
use crate::server::call_table::CallTable;
use crate::server::executor::OperationExecutor;

/// The server's receive loop: it decodes requests, decides based on the call table whether a
///  request is a new call, a retransmission or stale, and answers accordingly.
///
/// Comparing a request's sequence number `seq` with the entry's last admitted one `last`:
/// * `seq > last`: a new call. It is admitted and starts executing in the background; the reply
///     is the result if the call happened to finish right away, and an ACK otherwise.
/// * `seq == last`: a retransmission of the current call. The reply is the cached result if the
///     call completed, and an ACK if it is still running. It is never executed again.
/// * `seq < last`: a stale retransmission of an earlier call. The client moved on, so there is no
///     reply at all.
///
/// The loop never waits for a call to finish.
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    call_table: Arc<CallTable>,
    executor: Arc<OperationExecutor>,
}
impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, call_table: Arc<CallTable>, executor: Arc<OperationExecutor>) -> RequestDispatcher {
        RequestDispatcher {
            transport,
            call_table,
            executor,
        }
    }

    pub async fn recv_loop(&self, mut cancel_receiver: broadcast::Receiver<()>) {
        info!("starting receive loop");

        loop {
            select! {
                r = self.transport.recv() => {
                    match r {
                        Ok(datagram) => self.on_datagram(datagram).await,
                        Err(e) => error!(error = ?e, "error receiving from datagram socket"),
                    }
                }
                _ = cancel_receiver.recv() => break,
            }
        }

        info!("shutting down receive loop");
    }

    #[tracing::instrument(level = "trace", skip_all, fields(from = ?datagram.from))]
    pub async fn on_datagram(&self, datagram: Datagram) {
        let request = match RpcRequest::try_deser(&datagram.payload) {
            Ok(request) => request,
            Err(e) => {
                debug!("discarding malformed datagram: {}", e);
                return;
            }
        };

        if let Some(response) = self.handle_request(request).await {
            trace!("sending {:?} to {:?}", response, datagram.from);
            if let Err(e) = self.transport.send(datagram.from, &response.to_bytes()).await {
                error!("error sending response to {:?}: {}", datagram.from, e);
            }
        }
    }

    /// Applies the admission rule to a request, returning the response to send (if any)
    pub async fn handle_request(&self, request: RpcRequest) -> Option<RpcResponse> {
        debug!("Request received: {:?}", request);

        let entry = match self.call_table.find_or_insert(request.client_id).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(client_id = request.client_id, "refusing request: {}", e);
                return Some(RpcResponse::error(&request));
            }
        };

        let mut state = entry.lock().await;
        state.last_activity = Instant::now();

        if request.sequence_number > state.last_sequence_number {
            if state.executing {
                // only one call per client may execute at a time - the client keeps retrying
                //  and the call is admitted once the previous one finished
                debug!(client_id = request.client_id, "New Request -- previous call {} still executing, sending ACK", state.last_sequence_number);
                return Some(RpcResponse::ack(&request));
            }

            state.completed = false;
            state.executing = true;
            state.last_sequence_number = request.sequence_number;
            drop(state);

            self.executor.spawn(request, entry.clone());

            let state = entry.lock().await;
            if state.completed && state.last_sequence_number == request.sequence_number {
                debug!(client_id = request.client_id, "New Request -- Completed, sending VALUE, result = {}", state.result);
                Some(RpcResponse::value(&request, state.result))
            }
            else {
                debug!(client_id = request.client_id, "New Request -- In Progress, sending ACK");
                Some(RpcResponse::ack(&request))
            }
        }
        else if request.sequence_number == state.last_sequence_number {
            if state.completed {
                debug!(client_id = request.client_id, "Existing Request -- Completed, sending VALUE, result = {}", state.result);
                Some(RpcResponse::value(&request, state.result))
            }
            else {
                debug!(client_id = request.client_id, "Existing Request -- In Progress, sending ACK");
                Some(RpcResponse::ack(&request))
            }
        }
        else {
            debug!(client_id = request.client_id, "stale request, last sequence number is {} - ignoring", state.last_sequence_number);
            None
        }
    }
}
