use shared::{BetError, ProtocolError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Failures of the bet store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("storage lock poisoned")]
    Poisoned,

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid bet: {0}")]
    InvalidBet(#[from] BetError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("no request received within {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("empty batch")]
    EmptyBatch,

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}
