//! Binary encoding of protocol payloads
//!
//! Every typed payload starts with one type byte selecting the schema.
//! Integers are big-endian with a fixed width per field and strings carry
//! a one-byte length prefix. Two responses are untyped: the batch
//! confirmation (a bare 4-byte number) and the DONE acknowledgement
//! (a single [`ACK`] byte).

use crate::bet::{BetRecord, DATE_LEN};
use crate::error::{ProtocolError, Result};

pub const MESSAGE_TYPE_SINGLE_BET: u8 = 0x01;
pub const MESSAGE_TYPE_BATCH: u8 = 0x02;
pub const MESSAGE_TYPE_DONE: u8 = 0x03;
pub const MESSAGE_TYPE_GET_WINNERS: u8 = 0x04;
pub const MESSAGE_TYPE_WINNERS: u8 = 0x05;
pub const MESSAGE_TYPE_NOT_READY: u8 = 0x06;

/// Payload of the DONE acknowledgement
pub const ACK: u8 = 0x01;

/// Confirmation number signalling a failed batch
pub const FAILED_CONFIRMATION: u32 = 0;

/// Smallest possible encoded record: three empty strings
const MIN_RECORD_LEN: usize = 1 + 1 + 1 + 1 + DATE_LEN + 4;

/// Typed protocol messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SingleBet(BetRecord),
    Batch(Vec<BetRecord>),
    Done { agency: u8 },
    GetWinners { agency: u8 },
    Winners(Vec<String>),
    NotReady,
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::SingleBet(_) => MESSAGE_TYPE_SINGLE_BET,
            Message::Batch(_) => MESSAGE_TYPE_BATCH,
            Message::Done { .. } => MESSAGE_TYPE_DONE,
            Message::GetWinners { .. } => MESSAGE_TYPE_GET_WINNERS,
            Message::Winners(_) => MESSAGE_TYPE_WINNERS,
            Message::NotReady => MESSAGE_TYPE_NOT_READY,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = vec![self.type_byte()];

        match self {
            Message::SingleBet(record) => write_record(&mut buf, record)?,
            Message::Batch(records) => {
                write_count(&mut buf, records.len())?;
                for record in records {
                    write_record(&mut buf, record)?;
                }
            }
            Message::Done { agency } | Message::GetWinners { agency } => buf.push(*agency),
            Message::Winners(documents) => {
                write_count(&mut buf, documents.len())?;
                for document in documents {
                    write_string(&mut buf, document)?;
                }
            }
            Message::NotReady => {}
        }

        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let type_byte = reader
            .u8()
            .map_err(|_| ProtocolError::malformed("empty payload"))?;

        let message = match type_byte {
            MESSAGE_TYPE_SINGLE_BET => Message::SingleBet(read_record(&mut reader)?),
            MESSAGE_TYPE_BATCH => {
                let count = reader.u16()? as usize;
                // Reject impossible counts before allocating
                if count * MIN_RECORD_LEN > reader.remaining() {
                    return Err(ProtocolError::malformed(format!(
                        "batch declares {} records but only {} bytes follow",
                        count,
                        reader.remaining()
                    )));
                }

                let mut records = Vec::with_capacity(count);
                for _ in 0..count {
                    records.push(read_record(&mut reader)?);
                }
                Message::Batch(records)
            }
            MESSAGE_TYPE_DONE => Message::Done {
                agency: reader.u8()?,
            },
            MESSAGE_TYPE_GET_WINNERS => Message::GetWinners {
                agency: reader.u8()?,
            },
            MESSAGE_TYPE_WINNERS => {
                let count = reader.u16()? as usize;
                if count > reader.remaining() {
                    return Err(ProtocolError::malformed(format!(
                        "winners list declares {} documents but only {} bytes follow",
                        count,
                        reader.remaining()
                    )));
                }

                let mut documents = Vec::with_capacity(count);
                for _ in 0..count {
                    documents.push(reader.string()?);
                }
                Message::Winners(documents)
            }
            MESSAGE_TYPE_NOT_READY => Message::NotReady,
            other => {
                return Err(ProtocolError::malformed(format!(
                    "unknown message type {:#04x}",
                    other
                )))
            }
        };

        if reader.remaining() > 0 {
            return Err(ProtocolError::malformed(format!(
                "{} trailing bytes after message",
                reader.remaining()
            )));
        }

        Ok(message)
    }
}

/// Encodes the batch confirmation response
pub fn encode_confirmation(number: u32) -> Vec<u8> {
    number.to_be_bytes().to_vec()
}

pub fn decode_confirmation(data: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = data.try_into().map_err(|_| {
        ProtocolError::malformed(format!("confirmation must be 4 bytes, got {}", data.len()))
    })?;
    Ok(u32::from_be_bytes(bytes))
}

pub fn decode_ack(data: &[u8]) -> Result<()> {
    match data {
        [ACK] => Ok(()),
        other => Err(ProtocolError::malformed(format!(
            "unexpected acknowledgement {:?}",
            other
        ))),
    }
}

fn write_count(buf: &mut Vec<u8>, count: usize) -> Result<()> {
    let count = u16::try_from(count).map_err(|_| ProtocolError::MessageTooLarge(count))?;
    buf.extend_from_slice(&count.to_be_bytes());
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    let len = u8::try_from(bytes.len()).map_err(|_| ProtocolError::StringTooLong(bytes.len()))?;
    buf.push(len);
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_record(buf: &mut Vec<u8>, record: &BetRecord) -> Result<()> {
    if record.birth_date.len() != DATE_LEN || !record.birth_date.is_ascii() {
        return Err(ProtocolError::malformed(format!(
            "birth date {:?} is not {} ASCII bytes",
            record.birth_date, DATE_LEN
        )));
    }

    buf.push(record.agency);
    write_string(buf, &record.first_name)?;
    write_string(buf, &record.last_name)?;
    write_string(buf, &record.document)?;
    buf.extend_from_slice(record.birth_date.as_bytes());
    buf.extend_from_slice(&record.number.to_be_bytes());
    Ok(())
}

fn read_record(reader: &mut Reader<'_>) -> Result<BetRecord> {
    let agency = reader.u8()?;
    let first_name = reader.string()?;
    let last_name = reader.string()?;
    let document = reader.string()?;

    let date = reader
        .take(DATE_LEN)
        .map_err(|_| ProtocolError::malformed("birth date shorter than 10 bytes"))?;
    if !date.is_ascii() {
        return Err(ProtocolError::malformed("birth date is not ASCII"));
    }
    // ASCII is always valid UTF-8
    let birth_date = String::from_utf8_lossy(date).into_owned();

    let number = reader.u32()?;

    Ok(BetRecord {
        agency,
        first_name,
        last_name,
        document,
        birth_date,
        number,
    })
}

/// Cursor over a payload that fails instead of panicking on overruns
struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ProtocolError::malformed(format!(
                "need {} bytes at offset {}, only {} left",
                len,
                self.offset,
                self.remaining()
            )));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn string(&mut self) -> Result<String> {
        let len = self.u8()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| ProtocolError::malformed("string is not valid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bet::Bet;
    use chrono::NaiveDate;

    fn record(agency: u8, document: &str, number: u32) -> BetRecord {
        BetRecord {
            agency,
            first_name: "María José".to_string(),
            last_name: "Núñez".to_string(),
            document: document.to_string(),
            birth_date: "1985-11-02".to_string(),
            number,
        }
    }

    #[test]
    fn test_single_bet_layout() {
        let bet = BetRecord {
            agency: 7,
            first_name: "Ana".to_string(),
            last_name: "Paz".to_string(),
            document: "012".to_string(),
            birth_date: "2000-01-31".to_string(),
            number: 0x0102_0304,
        };

        let encoded = Message::SingleBet(bet).encode().unwrap();

        let mut expected = vec![MESSAGE_TYPE_SINGLE_BET, 7];
        expected.extend_from_slice(b"\x03Ana\x03Paz\x03012");
        expected.extend_from_slice(b"2000-01-31");
        expected.extend_from_slice(&[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_bet_roundtrip_keeps_leading_zeros() {
        let bet = Bet::new(
            1,
            "Juan",
            "Pérez",
            "00012345",
            NaiveDate::from_ymd_opt(1990, 12, 1).unwrap(),
            4_000_000_000,
        );

        let encoded = Message::SingleBet(BetRecord::from(&bet)).encode().unwrap();
        let decoded = match Message::decode(&encoded).unwrap() {
            Message::SingleBet(record) => Bet::try_from(record).unwrap(),
            other => panic!("Unexpected message {:?}", other),
        };

        assert_eq!(decoded, bet);
        assert_eq!(decoded.document, "00012345");
    }

    #[test]
    fn test_batch_preserves_order() {
        let records = vec![record(1, "1", 10), record(1, "2", 20), record(1, "3", 30)];
        let encoded = Message::Batch(records.clone()).encode().unwrap();

        assert_eq!(encoded[0], MESSAGE_TYPE_BATCH);
        assert_eq!(&encoded[1..3], &[0x00, 0x03]);

        match Message::decode(&encoded).unwrap() {
            Message::Batch(decoded) => {
                assert_eq!(decoded, records);
                assert_eq!(decoded.last().map(|r| r.number), Some(30));
            }
            other => panic!("Unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_control_messages() {
        assert_eq!(
            Message::Done { agency: 4 }.encode().unwrap(),
            vec![MESSAGE_TYPE_DONE, 4]
        );
        assert_eq!(
            Message::GetWinners { agency: 255 }.encode().unwrap(),
            vec![MESSAGE_TYPE_GET_WINNERS, 255]
        );
        assert_eq!(
            Message::NotReady.encode().unwrap(),
            vec![MESSAGE_TYPE_NOT_READY]
        );
        assert_eq!(
            Message::decode(&[MESSAGE_TYPE_DONE, 9]).unwrap(),
            Message::Done { agency: 9 }
        );
    }

    #[test]
    fn test_winners_layout() {
        let message = Message::Winners(vec!["30904465".to_string(), "007".to_string()]);
        let encoded = message.encode().unwrap();

        let mut expected = vec![MESSAGE_TYPE_WINNERS, 0x00, 0x02, 8];
        expected.extend_from_slice(b"30904465");
        expected.push(3);
        expected.extend_from_slice(b"007");
        assert_eq!(encoded, expected);
        assert_eq!(Message::decode(&encoded).unwrap(), message);

        let empty = Message::Winners(Vec::new()).encode().unwrap();
        assert_eq!(empty, vec![MESSAGE_TYPE_WINNERS, 0, 0]);
    }

    #[test]
    fn test_string_too_long() {
        let mut bet = record(1, "1", 1);
        bet.first_name = "x".repeat(256);
        assert!(matches!(
            Message::SingleBet(bet).encode(),
            Err(ProtocolError::StringTooLong(256))
        ));

        // Limit is on encoded bytes, not characters
        let mut bet = record(1, "1", 1);
        bet.last_name = "ñ".repeat(128);
        assert!(matches!(
            Message::SingleBet(bet).encode(),
            Err(ProtocolError::StringTooLong(256))
        ));

        let mut bet = record(1, "1", 1);
        bet.last_name = "x".repeat(255);
        assert!(Message::SingleBet(bet).encode().is_ok());
    }

    #[test]
    fn test_encode_rejects_bad_date_width() {
        let mut bet = record(1, "1", 1);
        bet.birth_date = "1985-1-2".to_string();
        assert!(matches!(
            Message::SingleBet(bet).encode(),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        assert!(matches!(
            Message::decode(&[0x7f]),
            Err(ProtocolError::MalformedMessage(_))
        ));
        assert!(matches!(
            Message::decode(&[]),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_string_past_end() {
        // first_name claims 20 bytes, only 3 follow
        let data = [MESSAGE_TYPE_SINGLE_BET, 1, 20, b'A', b'n', b'a'];
        assert!(matches!(
            Message::decode(&data),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_short_date() {
        let mut data = vec![MESSAGE_TYPE_SINGLE_BET, 1, 1, b'A', 1, b'B', 1, b'1'];
        data.extend_from_slice(b"1985-11");
        assert!(matches!(
            Message::decode(&data),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_batch_count_past_end() {
        let mut data = Message::Batch(vec![record(1, "1", 1)]).encode().unwrap();
        data[1] = 0x01; // count = 257
        data[2] = 0x01;
        assert!(matches!(
            Message::decode(&data),
            Err(ProtocolError::MalformedMessage(_))
        ));

        let mut truncated = Message::Batch(vec![record(1, "1", 1), record(1, "2", 2)])
            .encode()
            .unwrap();
        truncated.truncate(truncated.len() - 3);
        assert!(matches!(
            Message::decode(&truncated),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        assert!(matches!(
            Message::decode(&[MESSAGE_TYPE_DONE, 1, 0]),
            Err(ProtocolError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_confirmation_and_ack() {
        assert_eq!(encode_confirmation(30), vec![0, 0, 0, 30]);
        assert_eq!(decode_confirmation(&[0, 0, 1, 0]).unwrap(), 256);
        assert!(decode_confirmation(&[0, 0, 1]).is_err());

        assert!(decode_ack(&[ACK]).is_ok());
        assert!(decode_ack(&[0x00]).is_err());
        assert!(decode_ack(&[ACK, ACK]).is_err());
    }
}
