use clap::Parser;
use client::bets::{load_bets, pack_batches};
use client::network::{AgencyClient, RetryPolicy};
use log::info;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, env = "SERVER_ADDRESS", default_value = "127.0.0.1:12345")]
    server: String,

    /// Agency identifier
    #[arg(short = 'a', long, env = "AGENCY_ID")]
    agency: u8,

    /// CSV file with the agency's bets
    #[arg(short = 'f', long, env = "BETS_CSV")]
    bets: PathBuf,

    /// Maximum number of bets per batch
    #[arg(short = 'm', long, env = "BATCH_MAX_AMOUNT", default_value = "100")]
    batch_max_amount: usize,

    /// Winner queries to attempt while the lottery is not drawn
    #[arg(short = 'r', long, default_value = "10")]
    max_retries: u32,

    /// First retry delay in milliseconds, doubled on every retry
    #[arg(long, default_value = "200")]
    retry_delay_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    info!("Agency {} connecting to {}", args.agency, args.server);

    let records = load_bets(args.agency, &args.bets)?;
    info!(
        "Loaded {} bets from {}",
        records.len(),
        args.bets.display()
    );

    let batches = pack_batches(records, args.batch_max_amount);
    let client = AgencyClient::new(args.server, args.agency).with_retry_policy(RetryPolicy {
        max_attempts: args.max_retries,
        base_delay: Duration::from_millis(args.retry_delay_ms),
        ..RetryPolicy::default()
    });

    client.send_all(batches).await?;
    client.send_done().await?;

    let winners = client.get_winners().await?;
    info!(
        "Agency {}: lottery finished, {} winners",
        client.agency(),
        winners.len()
    );

    Ok(())
}
