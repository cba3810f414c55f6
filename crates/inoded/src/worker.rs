//! The store worker: a single task that owns the `ItemStore` and serializes
//! every mutating or reading store operation.
//!
//! Connection handlers never touch the store directly; they queue a
//! `WorkRequest` and await the reply. One owner, no locks, and a total order
//! over all store operations regardless of how many clients are connected.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use base64::Engine;
use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use inode_core::{proto, NodeError, NodeResult};
use inode_store::{Item, ItemStore, StrategySpec};

/// Actions that must go through the store worker.
pub const STORE_ACTIONS: &[&str] = &[
    "status",
    "item.create",
    "item.set_chunk",
    "item.get_chunk",
    "item.chunk_count",
    "item.crop",
    "item.finalize",
];

/// One queued request: the raw message plus a reply slot.
pub struct WorkRequest {
    pub message: Value,
    pub reply: oneshot::Sender<Value>,
}

/// Run the worker until shutdown. Every queued request gets a reply, even
/// the ones still in the queue when shutdown arrives.
pub async fn run(
    store: ItemStore,
    mut queue: mpsc::Receiver<WorkRequest>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let started = Instant::now();
    let mut items: HashMap<String, Item> = HashMap::new();
    info!(storage = %store.root().display(), "store worker ready");

    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                info!("store worker: shutdown signal received, draining");
                break;
            }
            request = queue.recv() => {
                let Some(request) = request else { break };
                respond(&store, &mut items, started, request);
            }
        }
    }

    // Anything still queued gets an error reply rather than silence.
    while let Ok(WorkRequest { message, reply }) = queue.try_recv() {
        let action = action_of(&message);
        let _ = reply.send(proto::error(&action, "node is shutting down"));
    }
    debug!("store worker exited");
}

fn respond(
    store: &ItemStore,
    items: &mut HashMap<String, Item>,
    started: Instant,
    request: WorkRequest,
) {
    let WorkRequest { message, reply } = request;
    let action = action_of(&message);
    let response = match handle(store, items, started, &action, message) {
        Ok(response) => response,
        Err(e) => {
            warn!(action, error = %e, "store action failed");
            proto::error(&action, e.to_string())
        }
    };
    // A dropped receiver means the client went away mid-request.
    let _ = reply.send(response);
}

fn action_of(message: &Value) -> String {
    message
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn handle(
    store: &ItemStore,
    items: &mut HashMap<String, Item>,
    started: Instant,
    action: &str,
    message: Value,
) -> NodeResult<Value> {
    match action {
        "status" => {
            let mut response = proto::success("status");
            response["version"] = json!(env!("CARGO_PKG_VERSION"));
            response["uptime_secs"] = json!(started.elapsed().as_secs());
            response["item_count"] = json!(store.list_items()?.len());
            Ok(response)
        }
        "item.create" => {
            let params: proto::CreateItemParams = parse_params(message)?;
            let mut item = store.create_item(
                &params.suggested_identifier,
                params.mime_type.as_deref().unwrap_or("text/plain"),
                params.classification.as_deref().unwrap_or("file"),
                StrategySpec::None,
            )?;
            store.save_item(&mut item)?;
            let identifier = item.identifier().to_string();
            items.insert(identifier.clone(), item);

            let mut response = proto::success("item.create");
            response["identifier"] = json!(identifier);
            Ok(response)
        }
        "item.set_chunk" => {
            let params: proto::ChunkWriteParams = parse_params(message)?;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&params.data)
                .map_err(|e| NodeError::Protocol(format!("undecodable chunk payload: {e}")))?;
            let item = open_cached(store, items, &params.identifier)?;
            item.set_chunk(params.chunk_no, &data)?;
            store.save_item(item)?;
            Ok(proto::success("item.set_chunk"))
        }
        "item.get_chunk" => {
            let params: proto::ChunkReadParams = parse_params(message)?;
            let item = open_cached(store, items, &params.identifier)?;
            let data = item.get_chunk(params.chunk_no)?;
            let mut response = proto::success("item.get_chunk");
            response["data"] = json!(base64::engine::general_purpose::STANDARD.encode(data));
            Ok(response)
        }
        "item.chunk_count" => {
            let params: proto::ItemParams = parse_params(message)?;
            let item = open_cached(store, items, &params.identifier)?;
            let mut response = proto::success("item.chunk_count");
            response["chunk_count"] = json!(item.chunk_count());
            Ok(response)
        }
        "item.crop" => {
            let params: proto::CropParams = parse_params(message)?;
            let item = open_cached(store, items, &params.identifier)?;
            item.crop_chunks(params.new_count)?;
            store.save_item(item)?;
            Ok(proto::success("item.crop"))
        }
        "item.finalize" => {
            let params: proto::ItemParams = parse_params(message)?;
            let item = open_cached(store, items, &params.identifier)?;
            item.finalize();
            store.save_item(item)?;
            Ok(proto::success("item.finalize"))
        }
        other => Ok(proto::unknown_action(other)),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(message: Value) -> NodeResult<T> {
    serde_json::from_value(message)
        .map_err(|e| NodeError::Protocol(format!("bad request parameters: {e}")))
}

fn open_cached<'a>(
    store: &ItemStore,
    items: &'a mut HashMap<String, Item>,
    identifier: &str,
) -> NodeResult<&'a mut Item> {
    match items.entry(identifier.to_string()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => Ok(entry.insert(store.open_item(identifier, None)?)),
    }
}
