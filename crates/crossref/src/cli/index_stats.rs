// cli/index_stats.rs: `crossref index-stats` subcommand
//
// Indexes a directory and reports timing metrics for each phase:
//   1. scan    : listing the documents of the corpus
//   2. rebuild : full index rebuild (collection, detection, providers)
//   3. views   : building the document view of every document
//   4. queries : counting every key under the active policy

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{parse_corpus_args, CorpusArgs};
use crate::perf::TimingGuard;
use crate::reference::{DocumentSource, FsSource, ProviderRegistry, ReferenceEngine};

/// Result of running a single phase.
pub struct PhaseResult {
    pub name: String,
    pub duration: Duration,
    pub peak_rss_bytes: Option<u64>,
    pub detail: String,
}

impl PhaseResult {
    fn finish(name: &str, started: Instant, detail: String) -> Self {
        Self {
            name: name.to_string(),
            duration: started.elapsed(),
            peak_rss_bytes: crate::perf::peak_rss_bytes(),
            detail,
        }
    }
}

/// Parse `index-stats` arguments from the remaining CLI args.
///
/// Expected usage: `crossref index-stats <root> [--policy <id>] [--config <file>] [--csv]`
pub fn parse_args(args: &mut impl Iterator<Item = String>) -> Result<CorpusArgs, String> {
    parse_corpus_args(args, &["<root>"], true)
}

/// Run the index-stats command and return phase results.
pub async fn run_index_stats(args: &CorpusArgs) -> anyhow::Result<Vec<PhaseResult>> {
    let config = args.index_config()?;
    let source = Arc::new(FsSource::new(args.root(), &config.extensions));
    let engine = ReferenceEngine::new(source.clone(), config, ProviderRegistry::new());
    let mut results = Vec::new();

    let documents = {
        let _guard = TimingGuard::new("index-stats:scan");
        let started = Instant::now();
        let documents = source.list_documents().await?;
        results.push(PhaseResult::finish(
            "scan",
            started,
            format!("{} documents", documents.len()),
        ));
        documents
    };

    {
        let _guard = TimingGuard::new("index-stats:rebuild");
        let started = Instant::now();
        let outcome = engine.rebuild_all().await?;
        let stats = engine.stats();
        results.push(PhaseResult::finish(
            "rebuild",
            started,
            format!(
                "{} documents, {} keys, {} records",
                outcome.processed(),
                stats.keys,
                stats.records
            ),
        ));
    }

    {
        let _guard = TimingGuard::new("index-stats:views");
        let started = Instant::now();
        let mut outgoing = 0usize;
        let mut incoming = 0usize;
        for doc in &documents {
            let view = engine.document_view(doc);
            outgoing += view.outgoing.len();
            incoming += view.incoming_count();
        }
        results.push(PhaseResult::finish(
            "views",
            started,
            format!(
                "{} views, {} outgoing, {} incoming",
                documents.len(),
                outgoing,
                incoming
            ),
        ));
    }

    {
        let _guard = TimingGuard::new("index-stats:queries");
        let started = Instant::now();
        let (keys, total) = engine.with_index(|index| {
            let keys = index.keys();
            let total: usize = keys.iter().map(|k| index.count(k)).sum();
            (keys.len(), total)
        });
        results.push(PhaseResult::finish(
            "queries",
            started,
            format!(
                "{} keys, {} counted under {}",
                keys,
                total,
                engine.active_policy()
            ),
        ));
    }

    Ok(results)
}

/// Print phase results in human-readable format.
pub fn print_results(results: &[PhaseResult]) {
    println!("=== Crossref Index Stats ===\n");
    for result in results {
        let rss_str = match result.peak_rss_bytes {
            Some(bytes) => format_bytes(bytes),
            None => "N/A".to_string(),
        };
        println!(
            "  {:<12} {:>10.2?}   RSS: {:<10}  ({})",
            result.name, result.duration, rss_str, result.detail
        );
    }

    if results.len() > 1 {
        let total: Duration = results.iter().map(|r| r.duration).sum();
        println!("\n  {:<12} {:>10.2?}", "TOTAL", total);
    }
    println!();
}

/// Print phase results in CSV format.
pub fn print_results_csv(results: &[PhaseResult]) {
    println!("phase,duration_ms,peak_rss_bytes,detail");
    for result in results {
        println!("{}", csv_row(result));
    }
}

fn csv_row(result: &PhaseResult) -> String {
    let rss = result
        .peak_rss_bytes
        .map_or(String::new(), |b| b.to_string());
    format!(
        "{},{:.3},{},\"{}\"",
        result.name,
        result.duration.as_secs_f64() * 1000.0,
        rss,
        result.detail.replace('"', "\"\"")
    )
}

/// Format a byte count as a human-readable string (e.g., "12.3 MB").
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::PolicyKind;

    fn corpus_args(root: &std::path::Path) -> CorpusArgs {
        CorpusArgs {
            positionals: vec![root.display().to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_args_csv_flag() {
        let mut args = vec![".".to_string(), "--csv".to_string()].into_iter();
        let result = parse_args(&mut args).unwrap();
        assert!(result.csv);
    }

    #[test]
    fn test_parse_args_rejects_second_path() {
        let mut args = vec![".".to_string(), ".".to_string()].into_iter();
        assert!(parse_args(&mut args).is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
        assert_eq!(format_bytes(5 * 1024 * 1024 * 1024), "5.0 GB");
    }

    #[test]
    fn test_csv_row_escapes_quotes() {
        let result = PhaseResult {
            name: "scan".to_string(),
            duration: Duration::from_millis(2),
            peak_rss_bytes: None,
            detail: "say \"hi\"".to_string(),
        };
        assert_eq!(csv_row(&result), "scan,2.000,,\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_run_index_stats_reports_all_phases() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.md"), "Links to [[beta]].\n").unwrap();
        std::fs::write(dir.path().join("beta.md"), "Back to [[alpha]] and [[alpha#Intro]].\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "[[alpha]]\n").unwrap();

        let results = run_index_stats(&corpus_args(dir.path())).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["scan", "rebuild", "views", "queries"]);
        assert_eq!(results[0].detail, "2 documents");
        assert!(results[1].detail.contains("3 records"), "{}", results[1].detail);
    }

    #[tokio::test]
    async fn test_run_index_stats_honours_policy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.md"), "[[beta]] [[Beta]]\n").unwrap();
        std::fs::write(dir.path().join("beta.md"), "nothing\n").unwrap();

        let mut args = corpus_args(dir.path());
        args.policy = Some(PolicyKind::UniqueSource);
        let results = run_index_stats(&args).await.unwrap();
        assert!(results[3].detail.ends_with("under unique-source"), "{}", results[3].detail);
    }
}
