//! Per-connection protocol handler.
//!
//! Each accepted socket gets its own task running this loop. `ping` and
//! `shutdown` are answered inline; store actions are forwarded to the worker
//! queue and the reply relayed back. A frame without a string `action` is a
//! protocol violation and the connection is dropped without a response.

use serde_json::Value;
use tokio::net::UnixStream;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

use inode_core::proto;

use crate::worker::{WorkRequest, STORE_ACTIONS};

pub async fn handle_connection(
    mut stream: UnixStream,
    queue: mpsc::Sender<WorkRequest>,
    shutdown: broadcast::Sender<()>,
) {
    loop {
        let message = match proto::read_message(&mut stream).await {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                debug!("closing client connection: {e}");
                return;
            }
        };
        let Some(action) = message
            .get("action")
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            debug!("client sent a frame without an action, dropping connection");
            return;
        };

        let response = match action.as_str() {
            "ping" => proto::pong(),
            "shutdown" => {
                // Acknowledge first so the client sees the confirmation
                // before the daemon starts tearing down.
                let ack = proto::success("shutdown");
                let _ = proto::write_message(&mut stream, &ack).await;
                let _ = shutdown.send(());
                return;
            }
            a if STORE_ACTIONS.contains(&a) => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let request = WorkRequest {
                    message,
                    reply: reply_tx,
                };
                if queue.send(request).await.is_err() {
                    proto::error(&action, "node is shutting down")
                } else {
                    match reply_rx.await {
                        Ok(response) => response,
                        Err(_) => proto::error(&action, "node is shutting down"),
                    }
                }
            }
            _ => proto::unknown_action(&action),
        };

        if let Err(e) = proto::write_message(&mut stream, &response).await {
            debug!("client went away before response: {e}");
            return;
        }
    }
}
