//! Loading an agency's bets and packing them into frames

use crate::error::{ClientError, Result};
use shared::{Bet, BetRecord, MAX_MESSAGE_SIZE};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Type byte plus the u16 record count
const BATCH_HEADER_LEN: usize = 1 + 2;

const CSV_FIELDS: usize = 5;

/// Reads `first_name,last_name,document,birth_date,number` lines
///
/// Blank lines are skipped. Every record is validated the same way the
/// server validates it, so a bad line is reported before anything is sent.
pub fn read_bets<R: BufRead>(agency: u8, reader: R) -> Result<Vec<BetRecord>> {
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != CSV_FIELDS {
            return Err(ClientError::InvalidCsv {
                line: line_no,
                reason: format!("expected {} fields, found {}", CSV_FIELDS, fields.len()),
            });
        }

        let number = fields[4].parse::<u32>().map_err(|e| ClientError::InvalidCsv {
            line: line_no,
            reason: format!("invalid number {:?}: {}", fields[4], e),
        })?;

        for name in &fields[..3] {
            if name.len() > u8::MAX as usize {
                return Err(ClientError::InvalidCsv {
                    line: line_no,
                    reason: format!("field longer than {} bytes", u8::MAX),
                });
            }
        }

        let record = BetRecord {
            agency,
            first_name: fields[0].to_string(),
            last_name: fields[1].to_string(),
            document: fields[2].to_string(),
            birth_date: fields[3].to_string(),
            number,
        };

        Bet::try_from(record.clone()).map_err(|source| ClientError::InvalidBet {
            line: line_no,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

pub fn load_bets(agency: u8, path: impl AsRef<Path>) -> Result<Vec<BetRecord>> {
    let file = File::open(path)?;
    read_bets(agency, BufReader::new(file))
}

/// Splits records into batches of at most `max_amount` that each fit in one frame
pub fn pack_batches(records: Vec<BetRecord>, max_amount: usize) -> Vec<Vec<BetRecord>> {
    let max_amount = max_amount.clamp(1, u16::MAX as usize);
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut current_len = BATCH_HEADER_LEN;

    for record in records {
        let len = record.encoded_len();
        let full = current.len() == max_amount || current_len + len > MAX_MESSAGE_SIZE;
        if full && !current.is_empty() {
            batches.push(std::mem::take(&mut current));
            current_len = BATCH_HEADER_LEN;
        }
        current_len += len;
        current.push(record);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}
