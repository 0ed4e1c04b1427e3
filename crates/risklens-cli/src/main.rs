mod analyze;
mod cli;
mod embed;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use risklens_ai::{RiskClassifier, embedding_provider};
use risklens_core::{LabelTaxonomy, ScorerConfig, Settings, VectorIndex};
use risklens_store::{MemoryIndex, Retriever};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::analyze::AnalyzeRequest;
use crate::cli::{Cli, Command};

#[derive(Serialize)]
struct Classified<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<Vec<risklens_ai::LabelScore>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct TaxonomyEntry<'a> {
    label: &'a str,
    key: &'a str,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    tracing::debug!("risklens v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let settings = cli.settings();
    settings.validate()?;

    match &cli.command {
        Command::Classify { texts, selection } => {
            let classifier = load_classifier(&settings.scorer)?;
            let selection = selection.selection();
            let results = {
                let texts = texts.clone();
                tokio::task::spawn_blocking(move || classifier.classify_with(&texts[..], selection))
                    .await?
            };
            let out: Vec<Classified<'_>> = texts
                .iter()
                .zip(results)
                .map(|(text, result)| match result {
                    Ok(labels) => Classified {
                        text,
                        labels: Some(labels),
                        error: None,
                    },
                    Err(e) => Classified {
                        text,
                        labels: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            print_json(&out)?;
        }
        Command::Retrieve { query, k, filter } => {
            let retriever = build_retriever(&cli, &settings).await?;
            let filter = filter.to_filter();
            let passages = retriever.retrieve(query, *k, filter.as_ref()).await?;
            let out: Vec<_> = passages
                .iter()
                .map(|p| serde_json::json!({ "citation": p.citation(), "text": p.text }))
                .collect();
            print_json(&out)?;
        }
        Command::Analyze {
            query,
            k,
            classify_limit,
            filter,
            selection,
        } => {
            let retriever = build_retriever(&cli, &settings).await?;
            let classifier = load_classifier(&settings.scorer)?;
            let filter = filter.to_filter();
            let report = analyze::analyze(
                &retriever,
                &classifier,
                AnalyzeRequest {
                    query,
                    k: *k,
                    filter: filter.as_ref(),
                    selection: selection.selection(),
                    classify_limit: *classify_limit,
                },
            )
            .await?;
            print_json(&report)?;
        }
        Command::Embed { input, output } => {
            let embedder = embedding_provider(&settings.embedding).await?;
            let (stats, passages) =
                embed::run_embed_pipeline(embedder.as_ref(), input, output).await?;
            eprintln!(
                "  Embedded {} passages in {:.1}s -> {}",
                stats.total_rows,
                stats.elapsed_secs,
                output.display()
            );
            write_lance(cli.retrieval.db.as_deref(), &passages).await?;
        }
        Command::Taxonomy => {
            let taxonomy = LabelTaxonomy::canonical();
            let out: Vec<TaxonomyEntry<'_>> = taxonomy
                .labels()
                .iter()
                .map(|l| TaxonomyEntry {
                    label: &l.name,
                    key: &l.key,
                })
                .collect();
            print_json(&out)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(feature = "onnx")]
fn load_classifier(config: &ScorerConfig) -> anyhow::Result<RiskClassifier> {
    RiskClassifier::load(config, LabelTaxonomy::canonical())
}

#[cfg(not(feature = "onnx"))]
fn load_classifier(_config: &ScorerConfig) -> anyhow::Result<RiskClassifier> {
    anyhow::bail!("classification requires the `onnx` feature")
}

async fn build_retriever(cli: &Cli, settings: &Settings) -> anyhow::Result<Retriever> {
    let embedder = embedding_provider(&settings.embedding).await?;
    let index = open_index(cli).await?;
    Ok(Retriever::new(embedder, index, settings.retrieval.clone())?)
}

async fn open_index(cli: &Cli) -> anyhow::Result<Arc<dyn VectorIndex>> {
    if let Some(db) = &cli.retrieval.db {
        return open_lance(db).await;
    }
    let path = cli
        .retrieval
        .passages
        .as_deref()
        .context("no index configured: pass --passages <file.jsonl> or --db <lancedb dir>")?;
    Ok(Arc::new(MemoryIndex::from_jsonl(path)?))
}

#[cfg(feature = "lancedb")]
async fn open_lance(db: &Path) -> anyhow::Result<Arc<dyn VectorIndex>> {
    Ok(Arc::new(risklens_store::LanceIndex::open(db).await?))
}

#[cfg(not(feature = "lancedb"))]
async fn open_lance(_db: &Path) -> anyhow::Result<Arc<dyn VectorIndex>> {
    anyhow::bail!("--db requires the `lancedb` feature; use --passages instead")
}

#[cfg(feature = "lancedb")]
async fn write_lance(
    db: Option<&Path>,
    passages: &[risklens_core::Passage],
) -> anyhow::Result<()> {
    let Some(db) = db else { return Ok(()) };
    eprintln!("  Writing to LanceDB...");
    let index = risklens_store::LanceIndex::open(db).await?;
    index
        .write(passages)
        .await
        .context("writing embedded passages to LanceDB")?;
    Ok(())
}

#[cfg(not(feature = "lancedb"))]
async fn write_lance(
    db: Option<&Path>,
    _passages: &[risklens_core::Passage],
) -> anyhow::Result<()> {
    if db.is_some() {
        anyhow::bail!("--db requires the `lancedb` feature");
    }
    Ok(())
}
