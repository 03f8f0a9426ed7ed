//! Duel Client - load generator for the duel server
//!
//! Plays many games in parallel. In every game one participant fires on a
//! fast cadence and the other on a slow one, so the fast side should win
//! almost every time.
//!
//! ```bash
//! duel-client --port 42069 -g 1000 -q 50 --fast 120 --slow 140
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_tungstenite::connect_async;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use duel_server::client::{play, Outcome, Tally};

/// Duel load-test client
#[derive(Parser, Debug)]
#[command(name = "duel-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server port
    #[arg(short, long, default_value_t = 42069)]
    port: u16,

    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Games to play in total
    #[arg(short, long, default_value_t = 10_000)]
    games: usize,

    /// Fire period of the fast participant in ms
    #[arg(short, long, default_value_t = 120)]
    fast: u64,

    /// Fire period of the slow participant in ms
    #[arg(short, long, default_value_t = 140)]
    slow: u64,

    /// Pause between starting games in ms
    #[arg(short, long, default_value_t = 2)]
    time_between: u64,

    /// Games in flight at once
    #[arg(short = 'q', long, default_value_t = 100)]
    parallel: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let url = format!("ws://{}:{}/", args.host, args.port);
    let fast = Duration::from_millis(args.fast);
    let slow = Duration::from_millis(args.slow);

    info!(%url, games = args.games, parallel = args.parallel, "Starting load run");

    let permits = Arc::new(Semaphore::new(args.parallel.max(1)));
    let tally = Arc::new(Mutex::new(Tally::default()));
    let mut handles = Vec::with_capacity(args.games);

    for i in 0..args.games {
        let permit = permits.clone().acquire_owned().await?;

        if i % 1000 == 0 {
            let failures = tally.lock().failures;
            info!(started = i, failures, "Progress");
        }

        tokio::time::sleep(Duration::from_millis(args.time_between)).await;

        // Connect the fast side first so it usually takes the near seat.
        let fast_stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to connect to server");
                continue;
            }
        };
        let slow_stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => stream,
            Err(e) => {
                warn!(error = %e, "Failed to connect to server");
                continue;
            }
        };

        let tally = tally.clone();
        handles.push(tokio::spawn(async move {
            let (fast_result, slow_result) =
                tokio::join!(play(fast_stream, Some(fast)), play(slow_stream, Some(slow)));

            for (side, result) in [("fast", &fast_result), ("slow", &slow_result)] {
                match result {
                    Ok(Outcome::TimedOut) => warn!(side, "Participant timed out"),
                    Err(e) => warn!(side, error = %e, "Participant failed"),
                    Ok(_) => {}
                }
            }

            tally.lock().record(&fast_result, &slow_result);
            drop(permit);
        }));
    }

    futures::future::join_all(handles).await;

    let tally = tally.lock().clone();
    println!("{}", serde_json::to_string_pretty(&tally)?);
    Ok(())
}
