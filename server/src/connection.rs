//! One request/response exchange with an agency
//!
//! A connection carries exactly one framed request. The handler decodes it,
//! applies it to the [`Coordinator`], writes one framed response and
//! returns; the caller closes the socket.

use crate::coordinator::{Coordinator, WinnersOutcome};
use crate::error::{Result, ServerError};
use log::{debug, error, info, warn};
use shared::codec::{
    encode_confirmation, Message, ACK, FAILED_CONFIRMATION, MESSAGE_TYPE_BATCH,
    MESSAGE_TYPE_SINGLE_BET,
};
use shared::{framing, Bet, ProtocolError, MAX_MESSAGE_SIZE};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

/// How long a peer may take to deliver its request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Reads one request from `stream`, handles it and writes the response
///
/// Only the request read is bounded by `request_timeout`; a winner query
/// may park for as long as the draw takes.
pub async fn handle_connection<S>(
    stream: &mut S,
    coordinator: &Coordinator,
    request_timeout: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = timeout(request_timeout, framing::receive(stream))
        .await
        .map_err(|_| ServerError::RequestTimeout(request_timeout))??;

    let Some(&type_byte) = payload.first() else {
        warn!("Dropping empty request");
        return Ok(());
    };
    debug!("Request type {:#04x}, {} bytes", type_byte, payload.len());

    match type_byte {
        MESSAGE_TYPE_BATCH | MESSAGE_TYPE_SINGLE_BET => {
            let confirmation = match store_request(&payload, coordinator).await {
                Ok(last_number) => last_number,
                Err(ServerError::Storage(e)) => {
                    error!("Failed to store batch: {}", e);
                    FAILED_CONFIRMATION
                }
                Err(e) => {
                    warn!("Batch rejected: {}", e);
                    FAILED_CONFIRMATION
                }
            };
            framing::send(stream, &encode_confirmation(confirmation)).await?;
        }
        _ => match Message::decode(&payload) {
            Ok(Message::Done { agency }) => {
                // The ACK does not depend on whether the draw succeeded
                if let Err(e) = coordinator.mark_done(agency).await {
                    warn!("Agency {} done, but the draw failed: {}", agency, e);
                }
                framing::send(stream, &[ACK]).await?;
            }
            Ok(Message::GetWinners { agency }) => {
                let response = match coordinator.wait_for_winners(agency).await {
                    WinnersOutcome::Ready(documents) => {
                        info!("Sending {} winners to agency {}", documents.len(), agency);
                        Message::Winners(documents)
                    }
                    WinnersOutcome::NotReady => {
                        info!("Lottery not drawn before shutdown, agency {} not served", agency);
                        Message::NotReady
                    }
                };
                framing::send(stream, &winners_payload(agency, &response)?).await?;
            }
            Ok(other) => {
                warn!("Unexpected message type {:#04x}, dropping", other.type_byte());
            }
            Err(e) => {
                warn!("Dropping request: {}", e);
            }
        },
    }

    Ok(())
}

/// Encodes a winner response, falling back to NOT_READY when it cannot be framed
fn winners_payload(agency: u8, response: &Message) -> Result<Vec<u8>> {
    match response.encode() {
        Ok(payload) if payload.len() <= MAX_MESSAGE_SIZE => Ok(payload),
        Ok(payload) => {
            error!(
                "Winners for agency {} take {} bytes, over the {} byte frame limit",
                agency,
                payload.len(),
                MAX_MESSAGE_SIZE
            );
            Ok(Message::NotReady.encode()?)
        }
        Err(e) => {
            error!("Failed to encode winners for agency {}: {}", agency, e);
            Ok(Message::NotReady.encode()?)
        }
    }
}

/// Decodes, validates and stores a BATCH or SINGLE_BET payload
async fn store_request(payload: &[u8], coordinator: &Coordinator) -> Result<u32> {
    let records = match Message::decode(payload)? {
        Message::Batch(records) => records,
        Message::SingleBet(record) => vec![record],
        other => {
            return Err(ProtocolError::malformed(format!(
                "expected bets, got message type {:#04x}",
                other.type_byte()
            ))
            .into())
        }
    };

    let bets = records
        .into_iter()
        .map(Bet::try_from)
        .collect::<std::result::Result<Vec<Bet>, _>>()?;

    coordinator.store_batch(bets).await
}
