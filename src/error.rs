//! Error types for the memory and completion collaborators.

/// Errors from the conversation log, embedder and vector indices.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("malformed {service} response: {reason}")]
    Malformed {
        service: &'static str,
        reason: String,
    },
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("invalid memory configuration: {0}")]
    Config(String),
    #[error("conversation log is empty")]
    EmptyLog,
}

/// Errors from a completion call. An empty choice list is not an error.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}
