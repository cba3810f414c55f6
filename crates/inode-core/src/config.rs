use serde::{Deserialize, Serialize};

/// Top-level node configuration (loaded from node.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub daemon: DaemonConfig,
    pub store: StoreConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    /// Depth of the internal store-worker request queue
    pub worker_queue_depth: usize,
    /// Ping timeout in milliseconds when probing a node's liveness
    pub ping_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Chunk size in bytes. Must be a multiple of the 16-byte cipher block
    /// so chunk offsets stay seekable.
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Key size used when generating a fresh node identity
    pub generate_bits: usize,
    /// Minimum accepted key size when loading an identity used for sealing
    pub min_bits: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            worker_queue_depth: 64,
            ping_timeout_ms: 5000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100 * 1024,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            generate_bits: 4096,
            min_bits: 4096,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let config: NodeConfig = toml::from_str("").unwrap();

        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.worker_queue_depth, 64);
        assert_eq!(config.daemon.ping_timeout_ms, 5000);
        assert_eq!(config.store.chunk_size, 102400);
        assert_eq!(config.identity.generate_bits, 4096);
        assert_eq!(config.identity.min_bits, 4096);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[daemon]
log_level = "debug"
log_format = "json"
worker_queue_depth = 16
ping_timeout_ms = 1500

[store]
chunk_size = 1024000

[identity]
generate_bits = 8192
min_bits = 4096
"#;
        let config: NodeConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.daemon.log_level, "debug");
        assert_eq!(config.daemon.log_format, "json");
        assert_eq!(config.daemon.worker_queue_depth, 16);
        assert_eq!(config.store.chunk_size, 1024000);
        assert_eq!(config.identity.generate_bits, 8192);
    }

    #[test]
    fn test_parse_partial_config() {
        let config: NodeConfig = toml::from_str("[store]\nchunk_size = 4096\n").unwrap();

        assert_eq!(config.store.chunk_size, 4096);
        // Defaults
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.identity.min_bits, 4096);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = NodeConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: NodeConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.store.chunk_size, parsed.store.chunk_size);
        assert_eq!(config.daemon.ping_timeout_ms, parsed.daemon.ping_timeout_ms);
    }
}
