//! Control-socket wire protocol.
//!
//! Each message is a `u32` big-endian length followed by that many bytes of
//! UTF-8 JSON. Requests carry a required `action` string field; responses
//! are either `{"action":"pong"}` or a response envelope:
//!
//! ```json
//! {"action":"response","responded_action":"...","response_type":"success"}
//! {"action":"response","responded_action":"...","response_type":"error","error_info":"..."}
//! ```
//!
//! Data-bearing success responses carry extra fields (e.g. `identifier`,
//! `data`, `chunk_count`) alongside the envelope.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{NodeError, NodeResult};

/// Upper bound on a single frame. A chunk payload is at most ~133 KiB after
/// base64, so this leaves generous headroom while bounding memory per
/// connection.
pub const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

/// Read one length-prefixed JSON message. Returns `Ok(None)` on a clean EOF
/// before the length header.
pub async fn read_message<R>(reader: &mut R) -> NodeResult<Option<Value>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(NodeError::Protocol(format!(
            "frame of {len} bytes exceeds maximum of {MAX_FRAME_LEN}"
        )));
    }

    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    let msg: Value = serde_json::from_slice(&payload)
        .map_err(|e| NodeError::Protocol(format!("malformed JSON frame: {e}")))?;
    Ok(Some(msg))
}

/// Write one length-prefixed JSON message.
pub async fn write_message<W>(writer: &mut W, msg: &Value) -> NodeResult<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(msg)
        .map_err(|e| NodeError::Protocol(format!("unserializable message: {e}")))?;
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(NodeError::Protocol(format!(
            "outgoing frame of {} bytes exceeds maximum of {MAX_FRAME_LEN}",
            payload.len()
        )));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub fn pong() -> Value {
    json!({ "action": "pong" })
}

pub fn success(responded_action: &str) -> Value {
    json!({
        "action": "response",
        "responded_action": responded_action,
        "response_type": "success",
    })
}

pub fn error(responded_action: &str, error_info: impl AsRef<str>) -> Value {
    json!({
        "action": "response",
        "responded_action": responded_action,
        "response_type": "error",
        "error_info": error_info.as_ref(),
    })
}

pub fn unknown_action(action: &str) -> Value {
    error(action, format!("unknown action: \"{action}\""))
}

/// True if the message is a success envelope.
pub fn is_success(msg: &Value) -> bool {
    msg.get("response_type").and_then(Value::as_str) == Some("success")
}

// ── Typed request payloads for store actions ──────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemParams {
    pub suggested_identifier: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkWriteParams {
    pub identifier: String,
    pub chunk_no: u64,
    /// base64-encoded chunk payload
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkReadParams {
    pub identifier: String,
    pub chunk_no: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemParams {
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropParams {
    pub identifier: String,
    pub new_count: u64,
}
