//! Control-socket protocol client.
//!
//! This is the real client for the daemon's length-prefixed JSON protocol,
//! replacing the old pattern of spawning a CLI subprocess per request.

use std::path::Path;
use std::time::Duration;

use base64::Engine;
use serde_json::{json, Value};
use tokio::net::UnixStream;

use inode_core::{proto, NodeError, NodeLayout, NodeResult};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct NodeClient {
    stream: UnixStream,
    timeout: Duration,
}

impl NodeClient {
    /// Connect to the daemon of the node rooted at `node_path`.
    pub async fn connect(node_path: impl AsRef<Path>) -> NodeResult<Self> {
        let layout = NodeLayout::new(node_path.as_ref());
        layout.validate(false)?;
        let stream = UnixStream::connect(layout.api_socket())
            .await
            .map_err(|e| {
                NodeError::State(format!(
                    "data server of node {} isn't reachable: {e}",
                    node_path.as_ref().display()
                ))
            })?;
        Ok(Self {
            stream,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send one request and wait for one response.
    pub async fn request(&mut self, msg: Value) -> NodeResult<Value> {
        proto::write_message(&mut self.stream, &msg).await?;
        let response = tokio::time::timeout(self.timeout, proto::read_message(&mut self.stream))
            .await
            .map_err(|_| NodeError::Protocol("request timed out".into()))??;
        response.ok_or_else(|| NodeError::Protocol("connection closed by daemon".into()))
    }

    /// Unwrap a response envelope, surfacing remote errors.
    fn expect_success(action: &str, response: Value) -> NodeResult<Value> {
        if proto::is_success(&response) {
            return Ok(response);
        }
        let info = response
            .get("error_info")
            .and_then(Value::as_str)
            .unwrap_or("no error details");
        Err(NodeError::Protocol(format!(
            "daemon rejected \"{action}\": {info}"
        )))
    }

    /// Liveness check; expects a `pong` back.
    pub async fn ping(&mut self) -> NodeResult<()> {
        let response = self.request(json!({ "action": "ping" })).await?;
        match response.get("action").and_then(Value::as_str) {
            Some("pong") => Ok(()),
            _ => Err(NodeError::Protocol(format!(
                "unexpected ping response: {response}"
            ))),
        }
    }

    /// Ask the daemon to terminate. The daemon acknowledges before going
    /// down.
    pub async fn shutdown(&mut self) -> NodeResult<()> {
        let response = self.request(json!({ "action": "shutdown" })).await?;
        Self::expect_success("shutdown", response).map(|_| ())
    }

    /// Daemon status summary (version, uptime, item count).
    pub async fn status(&mut self) -> NodeResult<Value> {
        let response = self.request(json!({ "action": "status" })).await?;
        Self::expect_success("status", response)
    }

    pub async fn create_item(
        &mut self,
        suggested_identifier: &str,
        mime_type: Option<&str>,
        classification: Option<&str>,
    ) -> NodeResult<String> {
        let response = self
            .request(json!({
                "action": "item.create",
                "suggested_identifier": suggested_identifier,
                "mime_type": mime_type,
                "classification": classification,
            }))
            .await?;
        let response = Self::expect_success("item.create", response)?;
        response
            .get("identifier")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| NodeError::Protocol("item.create response lacks identifier".into()))
    }

    pub async fn set_chunk(
        &mut self,
        identifier: &str,
        chunk_no: u64,
        data: &[u8],
    ) -> NodeResult<()> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(data);
        let response = self
            .request(json!({
                "action": "item.set_chunk",
                "identifier": identifier,
                "chunk_no": chunk_no,
                "data": encoded,
            }))
            .await?;
        Self::expect_success("item.set_chunk", response).map(|_| ())
    }

    pub async fn get_chunk(&mut self, identifier: &str, chunk_no: u64) -> NodeResult<Vec<u8>> {
        let response = self
            .request(json!({
                "action": "item.get_chunk",
                "identifier": identifier,
                "chunk_no": chunk_no,
            }))
            .await?;
        let response = Self::expect_success("item.get_chunk", response)?;
        let encoded = response
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| NodeError::Protocol("item.get_chunk response lacks data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| NodeError::Protocol(format!("undecodable chunk payload: {e}")))
    }

    pub async fn chunk_count(&mut self, identifier: &str) -> NodeResult<u64> {
        let response = self
            .request(json!({
                "action": "item.chunk_count",
                "identifier": identifier,
            }))
            .await?;
        let response = Self::expect_success("item.chunk_count", response)?;
        response
            .get("chunk_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| NodeError::Protocol("item.chunk_count response lacks count".into()))
    }

    pub async fn crop_chunks(&mut self, identifier: &str, new_count: u64) -> NodeResult<()> {
        let response = self
            .request(json!({
                "action": "item.crop",
                "identifier": identifier,
                "new_count": new_count,
            }))
            .await?;
        Self::expect_success("item.crop", response).map(|_| ())
    }

    pub async fn finalize_item(&mut self, identifier: &str) -> NodeResult<()> {
        let response = self
            .request(json!({
                "action": "item.finalize",
                "identifier": identifier,
            }))
            .await?;
        Self::expect_success("item.finalize", response).map(|_| ())
    }
}
