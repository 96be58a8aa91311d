use thiserror::Error;

#[derive(Debug, Error)]
pub enum TetherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl TetherError {
    /// Short, stable error code for log correlation and UI mapping.
    pub fn code(&self) -> &'static str {
        match self {
            TetherError::Config(_) => "CONFIG_ERROR",
            TetherError::Storage(_) => "STORAGE_ERROR",
            TetherError::Network(_) => "NETWORK_ERROR",
            TetherError::Parse(_) => "PARSE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;
