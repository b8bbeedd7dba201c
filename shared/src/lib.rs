//! Wire protocol shared by agencies and the lottery server
//!
//! - [`bet`]: the bet model, in wire form ([`BetRecord`]) and validated form ([`Bet`])
//! - [`codec`]: typed payloads and their byte layout
//! - [`framing`]: length-prefixed frames over any async byte stream
//! - [`error`]: protocol and conversion failures

pub mod bet;
pub mod codec;
pub mod error;
pub mod framing;

pub use bet::{Bet, BetRecord, DATE_FORMAT, DATE_LEN};
pub use codec::{
    decode_ack, decode_confirmation, encode_confirmation, Message, ACK, FAILED_CONFIRMATION,
};
pub use error::{BetError, ProtocolError};
pub use framing::{receive, send, MAX_MESSAGE_SIZE};
