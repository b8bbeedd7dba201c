//! Bet model shared by the agency client and the server
//!
//! A bet travels in two shapes:
//! - [`BetRecord`] mirrors the wire layout field by field, with the birth
//!   date still in its textual `YYYY-MM-DD` form.
//! - [`Bet`] is the validated value the server stores and draws from.

use crate::error::BetError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Textual layout of a birth date on the wire
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Exact byte width of an encoded birth date
pub const DATE_LEN: usize = 10;

/// One bet as laid out in a SINGLE_BET or BATCH payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BetRecord {
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birth_date: String,
    pub number: u32,
}

impl BetRecord {
    /// Number of bytes this record occupies once encoded
    ///
    /// agency(1) + three length-prefixed strings + date(10) + number(4).
    /// Clients use it to pack batches under the frame ceiling.
    pub fn encoded_len(&self) -> usize {
        1 + (1 + self.first_name.len())
            + (1 + self.last_name.len())
            + (1 + self.document.len())
            + DATE_LEN
            + 4
    }
}

/// A validated wager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birth_date: NaiveDate,
    pub number: u32,
}

impl Bet {
    pub fn new(
        agency: u8,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        document: impl Into<String>,
        birth_date: NaiveDate,
        number: u32,
    ) -> Self {
        Self {
            agency,
            first_name: first_name.into(),
            last_name: last_name.into(),
            document: document.into(),
            birth_date,
            number,
        }
    }
}

/// `YYYY-MM-DD` with ASCII digits only; chrono alone also takes padding and signs
fn is_fixed_width_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    bytes.len() == DATE_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}

fn is_valid_document(document: &str) -> bool {
    !document.is_empty() && document.bytes().all(|b| b.is_ascii_digit())
}

impl TryFrom<BetRecord> for Bet {
    type Error = BetError;

    fn try_from(record: BetRecord) -> Result<Self, Self::Error> {
        if !is_valid_document(&record.document) {
            return Err(BetError::InvalidDocument(record.document));
        }

        if !is_fixed_width_date(&record.birth_date) {
            return Err(BetError::InvalidBirthDate(record.birth_date));
        }
        let birth_date = NaiveDate::parse_from_str(&record.birth_date, DATE_FORMAT)
            .map_err(|_| BetError::InvalidBirthDate(record.birth_date.clone()))?;

        Ok(Self {
            agency: record.agency,
            first_name: record.first_name,
            last_name: record.last_name,
            document: record.document,
            birth_date,
            number: record.number,
        })
    }
}

impl From<&Bet> for BetRecord {
    fn from(bet: &Bet) -> Self {
        Self {
            agency: bet.agency,
            first_name: bet.first_name.clone(),
            last_name: bet.last_name.clone(),
            document: bet.document.clone(),
            birth_date: bet.birth_date.format(DATE_FORMAT).to_string(),
            number: bet.number,
        }
    }
}
