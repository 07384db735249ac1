//! channel-stats operator CLI
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | STATS_DEBUG | false | Debug-level logging |
//! | STATS_LOG_JSON | false | JSON log lines on stderr |
//! | STATS_STORE_DATA_DIR | ./channel-stats-db | fjall keyspace directory |
//! | STATS_FAN_OUT_WORKERS | 5 | Concurrent hour-bucket scans per query |
//! | RUST_LOG | | Overrides the log filter |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use channel_stats::{
    logging, ChatEvent, Classifier, CounterKind, CounterStore, FjallCounterStore, Ingestor,
    NoIdentity, QueryEngine, StatsConfig, StatsError,
};

#[derive(Parser, Debug)]
#[command(name = "channel-stats")]
#[command(version)]
#[command(about = "Hourly per-user chat activity counters", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest newline-delimited JSON chat events
    Ingest {
        /// Event file; stdin when omitted
        file: Option<PathBuf>,
    },
    /// Raw data points of one counter in one channel
    Datapoints(QueryArgs),
    /// Per-user sums of one counter
    Sum(QueryArgs),
    /// Per-user share of messages that incremented a counter
    Percentage(QueryArgs),
    /// Every stored counter
    Dump,
    /// List the counter kinds
    Counters,
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    #[arg(long)]
    channel: String,

    /// messages, positive, negative, link, emoji or word-count
    #[arg(long)]
    counter: CounterKind,

    /// First hour bucket, YYYY-MM-DDThh (defaults to the lookback window)
    #[arg(long)]
    start: Option<String>,

    /// Last hour bucket, YYYY-MM-DDThh (defaults to now)
    #[arg(long)]
    end: Option<String>,
}

#[derive(Serialize)]
struct IngestSummary {
    events: usize,
    counters: usize,
    skipped: usize,
}

#[derive(Serialize)]
struct CounterListing {
    name: &'static str,
    description: &'static str,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = StatsConfig::load(cli.config.as_deref())?;
    logging::init(config.debug, config.log_json);

    if let Commands::Counters = cli.command {
        let listing: Vec<_> = CounterKind::ALL
            .iter()
            .map(|kind| CounterListing {
                name: kind.as_str(),
                description: kind.describe(),
            })
            .collect();
        return print_json(&listing);
    }

    let store = Arc::new(FjallCounterStore::open(&config.store, Arc::new(NoIdentity))?);
    let outcome = run(cli.command, &config, Arc::clone(&store)).await;
    store.close()?;
    outcome
}

async fn run(
    command: Commands,
    config: &StatsConfig,
    store: Arc<FjallCounterStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = QueryEngine::new(store.clone(), &config.query);

    match command {
        Commands::Ingest { file } => {
            let ingestor = Ingestor::new(store, Classifier::default());
            let summary = tokio::task::spawn_blocking(move || ingest(&ingestor, file)).await??;
            info!(
                events = summary.events,
                counters = summary.counters,
                skipped = summary.skipped,
                "ingest finished"
            );
            print_json(&summary)
        }
        Commands::Datapoints(args) => {
            let range = engine.time_range(args.start.as_deref(), args.end.as_deref())?;
            print_json(&engine.data_points(&range, args.counter, &args.channel).await?)
        }
        Commands::Sum(args) => {
            let range = engine.time_range(args.start.as_deref(), args.end.as_deref())?;
            print_json(&engine.sum_by_user(&range, args.counter, &args.channel).await?)
        }
        Commands::Percentage(args) => {
            let range = engine.time_range(args.start.as_deref(), args.end.as_deref())?;
            print_json(
                &engine
                    .percentage_by_user(&range, args.counter, &args.channel)
                    .await?,
            )
        }
        Commands::Dump => print_json(&engine.all().await?),
        Commands::Counters => Ok(()),
    }
}

/// Feed every event line to the ingestor
///
/// Unparseable lines and events with bad timestamps are skipped; storage
/// errors stop the run.
fn ingest(ingestor: &Ingestor, file: Option<PathBuf>) -> Result<IngestSummary, StatsError> {
    let reader: Box<dyn BufRead + Send> = match &file {
        Some(path) => {
            let file = std::fs::File::open(path).map_err(|e| {
                StatsError::Config(format!("while opening events '{}': {}", path.display(), e))
            })?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(std::io::stdin())),
    };

    let mut summary = IngestSummary {
        events: 0,
        counters: 0,
        skipped: 0,
    };
    for (number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| StatsError::Config(format!("while reading events: {e}")))?;
        if line.trim().is_empty() {
            continue;
        }

        let event: ChatEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = number + 1, error = %e, "skipping unparseable event");
                summary.skipped += 1;
                continue;
            }
        };
        match ingestor.handle_event(&event) {
            Ok(touched) => {
                summary.events += 1;
                summary.counters += touched;
            }
            Err(e @ StatsError::InvalidTimestamp { .. }) => {
                warn!(line = number + 1, error = %e, "skipping event");
                summary.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
