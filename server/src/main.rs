use clap::Parser;
use log::info;
use server::coordinator::{has_won, Coordinator};
use server::network::{Server, ServerConfig};
use server::storage::FileBetStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind to
    #[arg(short = 'H', long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "SERVER_PORT", default_value = "12345")]
    port: u16,

    /// Pending connection backlog of the listening socket
    #[arg(short = 'b', long, env = "SERVER_LISTEN_BACKLOG", default_value = "5")]
    listen_backlog: u32,

    /// Connections served concurrently; the rest wait in a queue
    #[arg(short, long, env = "SERVER_WORKERS", default_value = "10")]
    workers: usize,

    /// Agencies that must send DONE before the draw runs
    #[arg(short, long, env = "EXPECTED_AGENCIES", default_value = "5")]
    expected_agencies: usize,

    /// File the bets are appended to
    #[arg(short = 'f', long, env = "BETS_FILE", default_value = "bets.bin")]
    bets_file: PathBuf,

    /// How long in-flight connections get to finish on shutdown, in milliseconds
    #[arg(long, env = "SHUTDOWN_GRACE_MS", default_value = "2000")]
    shutdown_grace_ms: u64,

    /// How long a connected peer may take to send its request, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    request_timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        listen_backlog: args.listen_backlog,
        workers: args.workers,
        expected_agencies: args.expected_agencies,
        shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
        request_timeout: Duration::from_millis(args.request_timeout_ms),
    };

    info!(
        "Starting lottery server: {} workers, waiting for {} agencies, bets in {}",
        config.workers,
        config.expected_agencies,
        args.bets_file.display()
    );

    let coordinator = Arc::new(Coordinator::new(
        FileBetStore::new(&args.bets_file),
        Arc::new(has_won),
        config.expected_agencies,
    ));

    let server = Server::bind(&config, coordinator)?;
    server.run_until_ctrl_c().await?;

    Ok(())
}
