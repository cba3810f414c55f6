use thiserror::Error;

pub type NodeResult<T> = Result<T, NodeError>;

/// Error taxonomy shared by all information-node crates.
///
/// Cryptographic and data-integrity failures (`Auth`, `Format`, `Length`)
/// always propagate to the caller as hard errors; proceeding on bad key
/// material risks producing or accepting corrupted plaintext.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("format error: {0}")]
    Format(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("policy error: {0}")]
    Policy(String),

    #[error("size error: payload is {actual} bytes, limit is {limit}")]
    Size { actual: usize, limit: usize },

    #[error("length error: {0}")]
    Length(String),

    #[error("alignment error: offset {0} is not a multiple of the cipher block size")]
    Alignment(u64),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("state error: {0}")]
    State(String),

    #[error("item contents are finalized; open a new content version to modify data")]
    Finalized,

    #[error("range error: no chunk with index {index} (chunk count is {count})")]
    Range { index: u64, count: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("permission error: {0}")]
    Permission(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NodeError {
    /// Short machine-readable tag used in protocol error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            NodeError::Format(_) => "format",
            NodeError::Auth(_) => "auth",
            NodeError::Policy(_) => "policy",
            NodeError::Size { .. } => "size",
            NodeError::Length(_) => "length",
            NodeError::Alignment(_) => "alignment",
            NodeError::Unsupported(_) => "unsupported",
            NodeError::State(_) => "state",
            NodeError::Finalized => "finalized",
            NodeError::Range { .. } => "range",
            NodeError::Protocol(_) => "protocol",
            NodeError::Permission(_) => "permission",
            NodeError::Crypto(_) => "crypto",
            NodeError::Io(_) => "io",
            NodeError::Other(_) => "other",
        }
    }
}
