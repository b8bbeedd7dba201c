use shared::{BetError, ProtocolError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    InvalidCsv { line: usize, reason: String },

    #[error("line {line}: {source}")]
    InvalidBet { line: usize, source: BetError },

    #[error("batch rejected: expected confirmation {expected}, got {received}")]
    BatchRejected { expected: u32, received: u32 },

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("lottery not drawn after {0} attempts")]
    LotteryNotReady(u32),
}
