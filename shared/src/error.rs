use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Failures raised by the framing layer and the codec.
///
/// Every variant is scoped to a single connection: callers drop the
/// connection and keep serving others.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("string too long: {0} bytes")]
    StringTooLong(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedMessage(msg.into())
    }
}

/// Raised when a decoded wire record cannot become a [`crate::Bet`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BetError {
    #[error("invalid birth date: {0}")]
    InvalidBirthDate(String),

    #[error("invalid document: {0:?}")]
    InvalidDocument(String),
}
