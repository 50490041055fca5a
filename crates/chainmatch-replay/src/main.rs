//! chainmatch-replay: replay a transaction log and print the state digest.
//!
//! Reads one JSON `Transaction` per line, applies each to a fresh engine and
//! prints a JSON summary with the state digest and trade root. Two
//! executors agree on a log exactly when their digests match.
//!
//! Usage:
//!   chainmatch-replay txlog.jsonl --config engine.json --events events.jsonl

mod logging;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chainmatch_engine::{Exchange, JsonLinesSink, MemoryStore};
use chainmatch_types::{ChainmatchError, EngineConfig, Transaction};
use clap::Parser;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "chainmatch-replay", version, about = "Replay a chainmatch transaction log")]
struct Args {
    /// JSON-lines transaction log. Blank lines and `#` comments are skipped.
    log: PathBuf,

    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write every committed event to this file, one JSON document per line.
    #[arg(long)]
    events: Option<PathBuf>,

    /// Emit logs as JSON instead of compact text.
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    /// After replaying, snapshot and restore the engine and check that the
    /// digest survives.
    #[arg(long, default_value_t = false)]
    verify_restore: bool,
}

/// Printed to stdout when the replay finishes.
#[derive(Debug, Serialize)]
struct Summary {
    applied: usize,
    rejected: usize,
    trades: usize,
    events: usize,
    last_sequence: Option<u64>,
    state_digest: String,
    trade_root: String,
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    EngineConfig::from_json_str(&json).with_context(|| format!("parsing config {}", path.display()))
}

fn read_log(reader: impl BufRead) -> Result<Vec<Transaction>> {
    let mut log = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let tx: Transaction = serde_json::from_str(trimmed)
            .with_context(|| format!("line {}: malformed transaction", index + 1))?;
        log.push(tx);
    }
    Ok(log)
}

/// Apply `log` in order. Rejections are counted; a broken supply
/// invariant aborts the replay.
fn replay(exchange: &mut Exchange, log: &[Transaction]) -> Result<(usize, usize)> {
    let (mut applied, mut rejected) = (0, 0);
    for tx in log {
        match exchange.apply(tx) {
            Ok(_) => applied += 1,
            Err(err @ ChainmatchError::SupplyInvariantViolation { .. }) => {
                return Err(err).with_context(|| {
                    format!("halting at sequence {}", tx.context.sequence)
                });
            }
            Err(_) => rejected += 1,
        }
    }
    Ok((applied, rejected))
}

fn verify_restore(exchange: &Exchange) -> Result<()> {
    let mut store = MemoryStore::new();
    exchange.persist(&mut store)?;
    let restored = Exchange::restore(exchange.config().clone(), &store)?;
    let (before, after) = (exchange.state_digest_hex(), restored.state_digest_hex());
    if before != after {
        anyhow::bail!("restored digest {after} differs from live digest {before}");
    }
    tracing::info!(entries = store.len(), digest = %after, "Snapshot round trip verified");
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.json_logs);

    let config = load_config(args.config.as_deref())?;
    let file = File::open(&args.log).with_context(|| format!("opening {}", args.log.display()))?;
    let log = read_log(BufReader::new(file))?;
    tracing::info!(path = %args.log.display(), transactions = log.len(), "Transaction log loaded");

    let mut exchange = match &args.events {
        Some(path) => {
            let out = File::create(path)
                .with_context(|| format!("creating events file {}", path.display()))?;
            Exchange::with_sink(config, Box::new(JsonLinesSink::new(BufWriter::new(out))))?
        }
        None => Exchange::new(config)?,
    };

    let (applied, rejected) = replay(&mut exchange, &log)?;
    if exchange.sink_failures() > 0 {
        tracing::warn!(failures = exchange.sink_failures(), "Some events were not written");
    }
    if args.verify_restore {
        verify_restore(&exchange)?;
    }

    let summary = Summary {
        applied,
        rejected,
        trades: exchange.trades().len(),
        events: exchange.events().len(),
        last_sequence: exchange.last_sequence(),
        state_digest: exchange.state_digest_hex(),
        trade_root: hex::encode(exchange.trade_root()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &str = r#"
# genesis
{"context":{"sequence":1,"caller":"aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa","now":0},"operation":{"op":"RegisterAccount","account":"aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa","role":"Admin"}}
{"context":{"sequence":2,"caller":"aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa","now":0},"operation":{"op":"Deposit","asset_id":"ETH","amount":"100"}}

{"context":{"sequence":3,"caller":"aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa","now":0},"operation":{"op":"Withdraw","asset_id":"ETH","amount":"500"}}
"#;

    #[test]
    fn reads_log_skipping_comments_and_blanks() {
        let log = read_log(LOG.as_bytes()).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[1].operation.name(), "Deposit");
    }

    #[test]
    fn malformed_line_reports_its_number() {
        let err = read_log("{}\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn replay_counts_rejections() {
        let log = read_log(LOG.as_bytes()).unwrap();
        let mut exchange = Exchange::new(EngineConfig::default()).unwrap();
        let (applied, rejected) = replay(&mut exchange, &log).unwrap();
        assert_eq!((applied, rejected), (2, 1));
        assert_eq!(exchange.last_sequence(), Some(2));
        verify_restore(&exchange).unwrap();
    }

    #[test]
    fn missing_config_uses_defaults() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
