//! End-to-end daemon test: run the daemon in-process against a temp node
//! directory and talk to it through the real client.

use std::path::Path;
use std::time::Duration;

use serde_json::json;

use inode_client::{check_node_status, NodeClient, NodeStatus};
use inode_core::{NodeConfig, NodeLayout};

fn make_node_dir(root: &Path) -> NodeLayout {
    let layout = NodeLayout::new(root);
    std::fs::create_dir_all(layout.storage_dir()).unwrap();
    // the daemon only checks the identity file exists; contents are loaded
    // lazily when an item actually needs sealing
    std::fs::write(layout.identity_file(), b"placeholder identity").unwrap();
    layout
}

async fn wait_for_socket(layout: &NodeLayout) {
    for _ in 0..100 {
        if layout.api_socket().exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("daemon socket never appeared");
}

#[tokio::test]
async fn test_daemon_full_session() {
    let dir = tempfile::tempdir().unwrap();
    let layout = make_node_dir(dir.path());
    let node_path = dir.path().to_path_buf();

    let daemon = tokio::spawn(inoded::daemon::run(node_path.clone(), NodeConfig::default()));
    wait_for_socket(&layout).await;

    let mut client = NodeClient::connect(&node_path).await.unwrap();
    client.ping().await.unwrap();

    let status = check_node_status(&node_path, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(status, NodeStatus::On);

    // unknown action comes back as the exact error envelope
    let response = client.request(json!({ "action": "bogus" })).await.unwrap();
    assert_eq!(response["response_type"], "error");
    assert_eq!(response["error_info"], "unknown action: \"bogus\"");

    // item round-trip over the socket
    let identifier = client
        .create_item("session-doc", Some("text/plain"), None)
        .await
        .unwrap();
    client.set_chunk(&identifier, 0, b"first chunk").await.unwrap();
    client.set_chunk(&identifier, 1, b"second chunk").await.unwrap();
    assert_eq!(client.chunk_count(&identifier).await.unwrap(), 2);
    assert_eq!(
        client.get_chunk(&identifier, 0).await.unwrap(),
        b"first chunk"
    );
    assert_eq!(
        client.get_chunk(&identifier, 1).await.unwrap(),
        b"second chunk"
    );

    client.crop_chunks(&identifier, 1).await.unwrap();
    assert_eq!(client.chunk_count(&identifier).await.unwrap(), 1);

    client.finalize_item(&identifier).await.unwrap();
    // writes after finalization are refused with an error envelope
    assert!(client.set_chunk(&identifier, 0, b"too late").await.is_err());
    // reads still work
    assert_eq!(
        client.get_chunk(&identifier, 0).await.unwrap(),
        b"first chunk"
    );

    let status = client.status().await.unwrap();
    assert_eq!(status["item_count"], json!(1));

    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .expect("daemon did not exit after shutdown")
        .unwrap()
        .unwrap();

    // clean teardown removes socket and pidfile
    assert!(!layout.api_socket().exists());
    assert!(!layout.pid_file().exists());
    assert_eq!(
        check_node_status(&node_path, Duration::from_secs(1))
            .await
            .unwrap(),
        NodeStatus::Off
    );
}

#[tokio::test]
async fn test_daemon_refuses_second_instance() {
    let dir = tempfile::tempdir().unwrap();
    let layout = make_node_dir(dir.path());
    let node_path = dir.path().to_path_buf();

    let daemon = tokio::spawn(inoded::daemon::run(node_path.clone(), NodeConfig::default()));
    wait_for_socket(&layout).await;

    let second = inoded::daemon::run(node_path.clone(), NodeConfig::default()).await;
    assert!(second.is_err());
    assert!(second
        .unwrap_err()
        .to_string()
        .contains("already running"));

    let mut client = NodeClient::connect(&node_path).await.unwrap();
    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_daemon_refuses_non_node_directory() {
    let dir = tempfile::tempdir().unwrap();
    // empty directory, never provisioned as a node
    let result = inoded::daemon::run(dir.path().to_path_buf(), NodeConfig::default()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_bad_chunk_size_refused_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let layout = make_node_dir(dir.path());

    let mut config = NodeConfig::default();
    config.store.chunk_size = 1000; // not a multiple of the cipher block

    let result = inoded::daemon::run(dir.path().to_path_buf(), config).await;
    assert!(result.is_err());
    // the failed start must not leave a pidfile or socket behind
    assert!(!layout.pid_file().exists());
    assert!(!layout.api_socket().exists());
}

#[tokio::test]
async fn test_items_survive_daemon_restart() {
    let dir = tempfile::tempdir().unwrap();
    let layout = make_node_dir(dir.path());
    let node_path = dir.path().to_path_buf();

    let daemon = tokio::spawn(inoded::daemon::run(node_path.clone(), NodeConfig::default()));
    wait_for_socket(&layout).await;

    let mut client = NodeClient::connect(&node_path).await.unwrap();
    let identifier = client.create_item("persistent", None, None).await.unwrap();
    client.set_chunk(&identifier, 0, b"durable data").await.unwrap();
    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let daemon = tokio::spawn(inoded::daemon::run(node_path.clone(), NodeConfig::default()));
    wait_for_socket(&layout).await;

    let mut client = NodeClient::connect(&node_path).await.unwrap();
    assert_eq!(
        client.get_chunk(&identifier, 0).await.unwrap(),
        b"durable data"
    );

    client.shutdown().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), daemon)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
