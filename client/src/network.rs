use crate::error::{ClientError, Result};
use log::{debug, info, warn};
use rand::Rng;
use shared::{decode_ack, decode_confirmation, framing, BetRecord, Message};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Retry policy for winner queries answered with NOT_READY
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay before retry number `attempt`, with up to 50% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let base = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
        base + Duration::from_millis(jitter_ms)
    }
}

/// Talks to the lottery server on behalf of one agency
///
/// Every request opens its own connection, matching the server's
/// one-request-per-connection model.
pub struct AgencyClient {
    server: String,
    agency: u8,
    retry: RetryPolicy,
}

impl AgencyClient {
    pub fn new(server: impl Into<String>, agency: u8) -> Self {
        Self {
            server: server.into(),
            agency,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn agency(&self) -> u8 {
        self.agency
    }

    async fn request(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(&self.server).await?;
        framing::send(&mut stream, payload).await?;
        let response = framing::receive(&mut stream).await?;
        if let Err(e) = stream.shutdown().await {
            debug!("Failed to close connection to {}: {}", self.server, e);
        }
        Ok(response)
    }

    /// Sends one batch and checks that the server confirmed its last number
    pub async fn send_batch(&self, batch: Vec<BetRecord>) -> Result<u32> {
        let Some(expected) = batch.last().map(|record| record.number) else {
            return Err(ClientError::UnexpectedResponse(
                "refusing to send an empty batch".to_string(),
            ));
        };
        let count = batch.len();

        let response = self.request(&Message::Batch(batch).encode()?).await?;
        let received = decode_confirmation(&response)?;
        if received != expected {
            warn!(
                "Agency {}: batch of {} bets rejected (confirmation {})",
                self.agency, count, received
            );
            return Err(ClientError::BatchRejected { expected, received });
        }

        debug!("Agency {}: stored batch of {} bets", self.agency, count);
        Ok(received)
    }

    /// Sends every batch in order, stopping at the first rejection
    pub async fn send_all(&self, batches: Vec<Vec<BetRecord>>) -> Result<usize> {
        let mut sent = 0;
        for batch in batches {
            let count = batch.len();
            self.send_batch(batch).await?;
            sent += count;
        }
        info!("Agency {}: all {} bets stored", self.agency, sent);
        Ok(sent)
    }

    pub async fn send_done(&self) -> Result<()> {
        let response = self
            .request(&Message::Done { agency: self.agency }.encode()?)
            .await?;
        decode_ack(&response)?;
        info!("Agency {}: done acknowledged", self.agency);
        Ok(())
    }

    /// Queries the winners once
    ///
    /// `None` means the server answered NOT_READY.
    pub async fn query_winners(&self) -> Result<Option<Vec<String>>> {
        let response = self
            .request(&Message::GetWinners { agency: self.agency }.encode()?)
            .await?;

        match Message::decode(&response)? {
            Message::Winners(documents) => Ok(Some(documents)),
            Message::NotReady => Ok(None),
            other => Err(ClientError::UnexpectedResponse(format!(
                "message type {:#04x}",
                other.type_byte()
            ))),
        }
    }

    /// Queries the winners, backing off while the server is not ready
    pub async fn get_winners(&self) -> Result<Vec<String>> {
        let attempts = self.retry.max_attempts.max(1);

        for attempt in 0..attempts {
            if let Some(documents) = self.query_winners().await? {
                info!(
                    "Agency {}: {} winners",
                    self.agency,
                    documents.len()
                );
                return Ok(documents);
            }

            if attempt + 1 < attempts {
                let delay = self.retry.delay(attempt);
                debug!(
                    "Agency {}: lottery not ready, retrying in {:?}",
                    self.agency, delay
                );
                sleep(delay).await;
            }
        }

        Err(ClientError::LotteryNotReady(attempts))
    }
}
