use thiserror::Error;

/// A remote call that did not produce an acknowledgement.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// Could not connect at all.
    #[error("remote unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-success status.
    #[error("remote rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("remote call timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The response body was not what we expected.
    #[error("could not decode response: {0}")]
    Decode(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl NetworkError {
    /// Whether retrying on the next reconnect can plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NetworkError::Unreachable(_) | NetworkError::Timeout { .. } => true,
            NetworkError::Rejected { status, .. } => *status >= 500 || *status == 429,
            NetworkError::Decode(_) => false,
            NetworkError::Http(_) => true,
        }
    }
}

impl From<NetworkError> for tether_core::TetherError {
    fn from(e: NetworkError) -> Self {
        tether_core::TetherError::Network(e.to_string())
    }
}
