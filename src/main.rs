//! ttlset - Stream De-duplicator
//!
//! Reads newline-delimited keys from stdin and echoes each one to stdout
//! only if it has not been seen within the TTL. Useful for collapsing
//! repeated request ids or log lines in a pipeline.

use anyhow::Context;
use std::time::Duration;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use ttlset::storage::{parse_secs, ExpiringSet, SetConfig};

/// Command-line configuration
struct Config {
    /// Seconds a key is remembered
    ttl: Duration,
    /// Maximum number of keys remembered
    max_size: Option<usize>,
    /// Seconds between background sweeps
    sweep_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            max_size: None,
            sweep_interval: Some(Duration::from_secs(1)),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments.
    ///
    /// Returns `None` when the process should exit successfully without
    /// running (`--help`, `--version`).
    fn from_args() -> anyhow::Result<Option<Self>> {
        let mut config = Config::default();
        let mut args = std::env::args().skip(1);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--ttl" | "-t" => {
                    let value = next_value(&mut args, "--ttl")?;
                    config.ttl = parse_secs("ttl", parse_f64(&value, "--ttl")?)?;
                }
                "--max-size" | "-m" => {
                    let value = next_value(&mut args, "--max-size")?;
                    config.max_size = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid --max-size: {}", value))?,
                    );
                }
                "--sweep-interval" | "-s" => {
                    let value = next_value(&mut args, "--sweep-interval")?;
                    let secs = parse_f64(&value, "--sweep-interval")?;
                    config.sweep_interval = if secs == 0.0 {
                        None
                    } else {
                        Some(parse_secs("sweep interval", secs)?)
                    };
                }
                "--help" | "-h" => {
                    print_help();
                    return Ok(None);
                }
                "--version" | "-v" => {
                    println!("ttlset version {}", ttlset::VERSION);
                    return Ok(None);
                }
                other => {
                    print_help();
                    anyhow::bail!("unknown argument: {}", other);
                }
            }
        }

        Ok(Some(config))
    }

    fn set_config(&self) -> SetConfig {
        SetConfig {
            ttl: self.ttl,
            max_size: self.max_size,
            sweep_interval: self.sweep_interval,
        }
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> anyhow::Result<String> {
    args.next()
        .with_context(|| format!("{} requires a value", flag))
}

fn parse_f64(value: &str, flag: &str) -> anyhow::Result<f64> {
    value
        .parse()
        .with_context(|| format!("invalid {}: {}", flag, value))
}

fn print_help() {
    println!(
        r#"
ttlset - Drop lines already seen within a time window

USAGE:
    ttlset [OPTIONS] < input

OPTIONS:
    -t, --ttl <SECS>               How long a line is remembered (default: 60)
    -m, --max-size <N>             Remember at most N lines, oldest first out
    -s, --sweep-interval <SECS>    Background sweep period, 0 to disable (default: 1)
    -v, --version                  Print version information
    -h, --help                     Print this help message

EXAMPLES:
    tail -f access.log | ttlset --ttl 5
    cat ids.txt | ttlset --ttl 300 --max-size 100000

Logs go to stderr; set RUST_LOG=debug for sweep and eviction details.
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Set up logging on stderr so stdout stays clean for the filtered stream
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let Some(config) = Config::from_args()? else {
        return Ok(());
    };

    let seen: ExpiringSet<String> =
        ExpiringSet::new(config.set_config()).context("failed to create expiring set")?;
    info!(
        ttl_ms = config.ttl.as_millis() as u64,
        max_size = ?config.max_size,
        "Filtering stdin"
    );

    // Stop on EOF or Ctrl+C
    tokio::select! {
        result = filter_lines(&seen) => result?,
        _ = signal::ctrl_c() => {
            warn!("Interrupted, stopping");
        }
    }

    seen.stop_reaper();
    let stats = seen.stats();
    info!(
        adds = stats.adds,
        duplicates = stats.refreshes,
        evicted = stats.evicted,
        expired = stats.expired,
        "Done"
    );

    Ok(())
}

/// Copies stdin to stdout, skipping lines that are still in `seen`.
async fn filter_lines(seen: &ExpiringSet<String>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut out = BufWriter::new(io::stdout());

    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if seen.insert(line.clone()) {
            out.write_all(line.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await?;
        }
    }

    out.flush().await?;
    Ok(())
}
