use thiserror::Error;

#[derive(Error, Debug)]
pub enum RingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed vector clock token: {0}")]
    MalformedClockToken(String),

    #[error("Incomparable vector clocks: {left} vs {right}")]
    IncomparableClocks { left: String, right: String },

    #[error("Replica {node} unavailable: {reason}")]
    ReplicaUnavailable { node: String, reason: String },

    #[error("Unknown node configuration: {0}")]
    UnknownNodeConfiguration(String),

    #[error("Remote node {node} replied with status {status}: {body}")]
    Remote {
        node: String,
        status: u16,
        body: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RingError {
    /// Whether the failure is confined to a single peer call.
    pub fn is_replica_failure(&self) -> bool {
        matches!(self, Self::ReplicaUnavailable { .. } | Self::Remote { .. })
    }
}

pub type Result<T> = std::result::Result<T, RingError>;
