//! # Lottery Server Library
//!
//! Central server of the lottery intake system. Agencies connect over TCP,
//! submit batches of bets, signal when they are done, and later ask for
//! their winners. The server stores every bet, runs a single draw once all
//! expected agencies have finished, and hands each agency its own winners.
//!
//! ## Connection Model
//!
//! Every TCP connection carries exactly one request and one response, then
//! it is closed. Requests use the length-prefixed binary protocol from the
//! `shared` crate:
//! - **BATCH / SINGLE_BET**: stored atomically, answered with the number of
//!   the last bet (or `0` when anything went wrong)
//! - **DONE**: marks the agency finished, answered with a one-byte ACK
//! - **GET_WINNERS**: parks until the draw, answered with WINNERS, or with
//!   NOT_READY when the server shuts down first
//!
//! ## Module Organization
//!
//! ### Coordinator Module (`coordinator`)
//! Process-wide shared state behind one lock:
//! - Known and finished agencies
//! - The one-shot lottery barrier and its winners map
//! - The rendezvous that releases parked winner queries
//!
//! ### Connection Module (`connection`)
//! Reads one framed request, dispatches it to the coordinator and writes the
//! response. Failures stay inside the connection.
//!
//! ### Network Module (`network`)
//! TCP listener, bounded worker pool fed by a queue, and graceful shutdown
//! with a grace period for in-flight connections.
//!
//! ### Storage Module (`storage`)
//! The append-only bet store and the storage lock that keeps batch appends
//! and the draw's full read from interleaving.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::coordinator::{has_won, Coordinator};
//! use server::network::{Server, ServerConfig};
//! use server::storage::FileBetStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let coordinator = Arc::new(Coordinator::new(
//!         FileBetStore::new("bets.bin"),
//!         Arc::new(has_won),
//!         config.expected_agencies,
//!     ));
//!
//!     // Serves agencies until Ctrl-C or SIGTERM, then drains the workers
//!     Server::bind(&config, coordinator)?.run_until_ctrl_c().await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod coordinator;
pub mod error;
pub mod network;
pub mod storage;

pub use error::{ServerError, StorageError};
