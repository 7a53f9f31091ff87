// cli/inspect.rs: `crossref query` and `crossref view` subcommands
//
// Both index a directory and print one slice of the index as JSON.

use serde_json::{json, Value};

use super::{open_corpus, parse_corpus_args, CorpusArgs};
use crate::reference::{DocumentId, ReferenceEngine};

/// Parse `query` arguments: `<root> <key> [--policy <id>] [--config <file>]`
pub fn parse_query_args(args: &mut impl Iterator<Item = String>) -> Result<CorpusArgs, String> {
    parse_corpus_args(args, &["<root>", "<key>"], false)
}

/// Parse `view` arguments: `<root> <document> [--policy <id>] [--config <file>]`
pub fn parse_view_args(args: &mut impl Iterator<Item = String>) -> Result<CorpusArgs, String> {
    parse_corpus_args(args, &["<root>", "<document>"], false)
}

/// Policy-filtered records and count of one key
pub fn query_json(engine: &ReferenceEngine, key: &str) -> serde_json::Result<Value> {
    Ok(json!({
        "key": key,
        "policy": engine.active_policy(),
        "count": engine.count(key),
        "records": serde_json::to_value(engine.query(key))?,
    }))
}

pub fn view_json(engine: &ReferenceEngine, doc: &DocumentId) -> serde_json::Result<Value> {
    serde_json::to_value(engine.document_view(doc).as_ref())
}

pub async fn run_query(args: &CorpusArgs) -> anyhow::Result<()> {
    let (_, engine, _) = open_corpus(args).await?;
    let value = query_json(&engine, &args.positionals[1])?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

pub async fn run_view(args: &CorpusArgs) -> anyhow::Result<()> {
    let (_, engine, _) = open_corpus(args).await?;
    let doc = DocumentId::new(args.positionals[1].replace('\\', "/"));
    if !engine.with_index(|index| index.contains_document(&doc)) {
        log::info!("{} contributes no references", doc);
    }
    let value = view_json(&engine, &doc)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
