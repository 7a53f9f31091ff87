// cli/mod.rs: subcommands of the `crossref` binary
//
// Every subcommand indexes a directory of documents first; the shared
// argument handling and engine setup live here.

pub mod index_stats;
pub mod inspect;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use crate::reference::{
    FsSource, IndexConfig, PolicyKind, ProviderRegistry, RebuildOutcome, ReferenceEngine,
};

/// Arguments common to all subcommands
#[derive(Debug, Default)]
pub struct CorpusArgs {
    /// Positional arguments, in order (the corpus root first)
    pub positionals: Vec<String>,
    pub policy: Option<PolicyKind>,
    pub config: Option<PathBuf>,
    pub csv: bool,
}

impl CorpusArgs {
    pub fn root(&self) -> PathBuf {
        PathBuf::from(&self.positionals[0])
    }

    /// Load the JSON config (if any) and apply the `--policy` override
    pub fn index_config(&self) -> anyhow::Result<IndexConfig> {
        let mut config = match &self.config {
            Some(path) => IndexConfig::load(path)?,
            None => IndexConfig::default(),
        };
        if let Some(policy) = self.policy {
            config.policy = policy;
        }
        Ok(config)
    }
}

/// Parse `<root> [positionals...] [--policy <id>] [--config <file>] [--csv]`.
///
/// `positionals` is the number of positional arguments expected, root
/// included; `allow_csv` enables the `--csv` flag.
pub fn parse_corpus_args(
    args: &mut impl Iterator<Item = String>,
    positionals: &[&str],
    allow_csv: bool,
) -> Result<CorpusArgs, String> {
    let mut parsed = CorpusArgs::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--csv" if allow_csv => parsed.csv = true,
            "--policy" => {
                let id = args
                    .next()
                    .ok_or_else(|| "--policy requires a policy name".to_string())?;
                parsed.policy = Some(id.parse::<PolicyKind>()?);
            }
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| "--config requires a file path".to_string())?;
                parsed.config = Some(PathBuf::from(path));
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown flag: '{}'", other));
            }
            _ => {
                if parsed.positionals.len() == positionals.len() {
                    return Err(format!(
                        "Too many arguments; expected {}",
                        positionals.join(" ")
                    ));
                }
                parsed.positionals.push(arg);
            }
        }
    }

    if let Some(missing) = positionals.get(parsed.positionals.len()) {
        return Err(format!("Missing required {} argument", missing));
    }
    let root = parsed.root();
    if !root.is_dir() {
        return Err(format!("Not a directory: {}", root.display()));
    }
    Ok(parsed)
}

/// Open a file-system corpus and build its index
pub async fn open_corpus(
    args: &CorpusArgs,
) -> anyhow::Result<(Arc<FsSource>, ReferenceEngine, RebuildOutcome)> {
    let config = args.index_config()?;
    // Watcher events carry absolute paths; the root must match them
    let root = std::fs::canonicalize(args.root())?;
    let source = Arc::new(FsSource::new(root, &config.extensions));
    let engine = ReferenceEngine::new(source.clone(), config, ProviderRegistry::new());
    let outcome = engine.rebuild_all().await?;
    Ok((source, engine, outcome))
}
