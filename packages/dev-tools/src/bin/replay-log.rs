//! Transaction Log Replay
//!
//! Replays a JSON transaction log against a JSON snapshot through the same
//! commit pipeline the application uses, then prints the result.
//!
//! # Usage
//!
//! ```bash
//! # Print the resulting snapshot as JSON
//! cargo run --bin replay-log -- snapshot.json transactions.json
//!
//! # Start from an empty snapshot and print one story as an outline
//! cargo run --bin replay-log -- - transactions.json --story <story-id>
//! ```
//!
//! The transaction log is a JSON array of `{ id, operations, workspaceId? }`.
//! Replay stops at the first transaction the snapshot rejects.
//!
//! Logging follows `RUST_LOG` and defaults to `info`.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use blockdoc_core::{
    operations::Transaction,
    services::{CommitDispatcher, CommitRequest, LocalCommitDispatcher, TransactionPersister},
    BlockSnapshot, CommitConfig, ListPath,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Replay is offline: persisting is a no-op
struct DiscardPersister;

#[async_trait]
impl TransactionPersister for DiscardPersister {
    async fn save_transactions(&self, transactions: Vec<Transaction>) -> Result<()> {
        tracing::debug!("Discarding {} replayed transaction(s)", transactions.len());
        Ok(())
    }
}

struct Args {
    snapshot: Option<PathBuf>,
    log: PathBuf,
    story: Option<String>,
}

fn parse_args() -> Result<Args> {
    let mut positional = Vec::new();
    let mut story = None;
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--story" => story = Some(args.next().context("--story needs a story id")?),
            _ => positional.push(arg),
        }
    }

    match positional.as_slice() {
        [snapshot, log] => Ok(Args {
            snapshot: (snapshot != "-").then(|| PathBuf::from(snapshot)),
            log: PathBuf::from(log),
            story,
        }),
        _ => bail!("usage: replay-log <snapshot.json|-> <transactions.json> [--story <id>]"),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid JSON in {}", path.display()))
}

/// Indented outline of a story: `children` first, then `resources`
fn outline(snapshot: &BlockSnapshot, id: &str, depth: usize, out: &mut String) {
    let Some(block) = snapshot.get_block(id) else {
        return;
    };
    if !block.alive {
        return;
    }
    let title = block.title();
    out.push_str(&format!(
        "{}{:?} {}{}\n",
        "  ".repeat(depth),
        block.block_type,
        block.id,
        if title.is_empty() { String::new() } else { format!(" \"{}\"", title) }
    ));
    for list in ListPath::BLOCK_LISTS {
        for child_id in block.list(list).unwrap_or_default() {
            outline(snapshot, child_id, depth + 1, out);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let snapshot: BlockSnapshot = match &args.snapshot {
        Some(path) => read_json(path)?,
        None => BlockSnapshot::new(),
    };
    let log: Vec<Transaction> = read_json(&args.log)?;
    tracing::info!(
        "Replaying {} transaction(s) over {} block(s)",
        log.len(),
        snapshot.len()
    );

    let dispatcher = LocalCommitDispatcher::with_snapshot(
        snapshot,
        Arc::new(DiscardPersister),
        CommitConfig::default(),
    )?;

    for (index, transaction) in log.into_iter().enumerate() {
        let transaction_id = transaction.id.clone();
        dispatcher
            .commit(CommitRequest::new(transaction).should_reformat(false))
            .await
            .with_context(|| format!("Transaction #{} ({}) failed", index, transaction_id))?;
    }

    let snapshot = dispatcher.snapshot().await;
    tracing::info!("Replay finished at version {}", snapshot.version());

    match args.story {
        Some(story_id) => {
            if snapshot.get_block(&story_id).is_none() {
                bail!("Story {} not found after replay", story_id);
            }
            let mut out = String::new();
            outline(&snapshot, &story_id, 0, &mut out);
            print!("{}", out);
        }
        None => println!("{}", serde_json::to_string_pretty(&snapshot)?),
    }

    Ok(())
}
