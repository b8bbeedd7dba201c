//! # Agency Client Library
//!
//! Client side of the lottery intake system. An agency reads its bets from a
//! CSV file, submits them to the central server in batches, announces that
//! it is done, and finally asks which of its bettors won.
//!
//! ## Flow
//!
//! 1. **Load**: every CSV line becomes a validated bet record
//! 2. **Batch**: records are packed into batches that respect both the
//!    configured maximum amount and the protocol's frame ceiling
//! 3. **Submit**: each batch travels on its own connection; the server
//!    answers with the number of the last bet it stored
//! 4. **Done**: the agency tells the server it has nothing more to send
//! 5. **Winners**: the query blocks on the server until the draw; when the
//!    server answers NOT_READY the client backs off and retries
//!
//! ## Module Organization
//!
//! ### Bets Module (`bets`)
//! CSV loading and batch packing.
//!
//! ### Network Module (`network`)
//! [`network::AgencyClient`] and its retry policy.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::bets::{load_bets, pack_batches};
//! use client::network::AgencyClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), client::ClientError> {
//!     let client = AgencyClient::new("127.0.0.1:12345", 1);
//!
//!     let batches = pack_batches(load_bets(1, "agency-1.csv")?, 100);
//!     client.send_all(batches).await?;
//!     client.send_done().await?;
//!
//!     let winners = client.get_winners().await?;
//!     println!("{} winners", winners.len());
//!     Ok(())
//! }
//! ```

pub mod bets;
pub mod error;
pub mod network;

pub use error::ClientError;
