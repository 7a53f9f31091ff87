// cli/watch.rs: `crossref watch` subcommand
//
// Indexes a directory, then follows file-system events and feeds them to
// the engine as incremental updates until interrupted with Ctrl-C.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::{open_corpus, parse_corpus_args, CorpusArgs};
use crate::reference::{FsSource, ReferenceEngine, UpdateOutcome};

/// What a file-system event did to the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathChange {
    Updated(UpdateOutcome),
    Removed(usize),
}

/// Parse `watch` arguments: `<root> [--policy <id>] [--config <file>]`
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<CorpusArgs, String> {
    parse_corpus_args(args, &["<root>"], false)
}

/// Paths touched by an event, or nothing for pure access events
fn changed_paths(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(_) => Vec::new(),
        _ => event.paths,
    }
}

/// Apply one changed path to the index.
///
/// An existing file is recomputed, a missing one is removed. Returns `None`
/// for paths that are not documents of `source`.
pub async fn apply_path_change(
    source: &FsSource,
    engine: &ReferenceEngine,
    path: &Path,
) -> Option<PathChange> {
    let doc = source.document_for_path(path)?;
    let change = if tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file()) {
        PathChange::Updated(engine.on_document_changed(&doc).await)
    } else {
        PathChange::Removed(engine.on_document_deleted(&doc).await)
    };
    log::info!("{}: {:?}", doc, change);
    Some(change)
}

pub async fn run_watch(args: &CorpusArgs) -> anyhow::Result<()> {
    let (source, engine, outcome) = open_corpus(args).await?;
    let stats = engine.stats();
    println!(
        "Indexed {} documents ({} keys, {} records) under {}; watching {}",
        outcome.processed(),
        stats.keys,
        stats.records,
        stats.policy,
        source.root().display()
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        },
        NotifyConfig::default(),
    )?;
    watcher.watch(source.root(), RecursiveMode::Recursive)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("Interrupted, stopping watcher");
                break;
            }
            received = rx.recv() => {
                let Some(received) = received else {
                    log::warn!("Watcher channel closed");
                    break;
                };
                let event = match received {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("Watch error: {}", e);
                        continue;
                    }
                };
                // One event may name the same path more than once (renames)
                let paths: IndexSet<PathBuf> = changed_paths(event).into_iter().collect();
                for path in &paths {
                    apply_path_change(&source, &engine, path).await;
                }
            }
        }
    }

    drop(watcher);
    println!("{}", serde_json::to_string_pretty(&engine.stats())?);
    Ok(())
}
