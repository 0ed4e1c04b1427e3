//! Embedding pipeline: reads chunked filing text, embeds it, and writes an
//! index the other subcommands can search.
//!
//! Input is JSON lines, one chunk per line, with the fields written by the
//! chunker: `chunk_id`, `text`, `issuer`, `fiscal_year`, `section` and
//! `filepath`.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use risklens_core::{EmbeddingProvider, Passage, PassageMetadata};
use serde::Deserialize;

/// Texts per `embed_batch` call.
const EMBED_BATCH_SIZE: usize = 256;

#[derive(Debug, Deserialize)]
struct ChunkRecord {
    #[serde(alias = "chunk_id")]
    id: String,
    text: String,
    #[serde(default)]
    issuer: String,
    #[serde(default)]
    fiscal_year: String,
    #[serde(default)]
    section: String,
    #[serde(default, alias = "filepath")]
    source: String,
}

impl ChunkRecord {
    fn into_passage(self, embedding: Vec<f32>) -> Passage {
        Passage {
            id: self.id,
            text: self.text,
            embedding,
            metadata: PassageMetadata {
                issuer: self.issuer,
                fiscal_year: self.fiscal_year,
                section: self.section,
                source: self.source,
            },
        }
    }
}

pub struct EmbedStats {
    pub total_rows: usize,
    pub elapsed_secs: f64,
}

/// Read chunks from `input` and embed them in sub-batches.
pub async fn embed_chunks(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
) -> anyhow::Result<Vec<Passage>> {
    let chunks = read_chunks(input)?;
    let total_rows = chunks.len();
    eprintln!("  Read {total_rows} chunks from {}", input.display());

    let mut passages = Vec::with_capacity(total_rows);
    let mut remaining = chunks.into_iter();
    loop {
        let batch: Vec<ChunkRecord> = remaining.by_ref().take(EMBED_BATCH_SIZE).collect();
        if batch.is_empty() {
            break;
        }

        let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .with_context(|| format!("embedding chunks from {}", batch[0].id))?;
        anyhow::ensure!(
            embeddings.len() == batch.len(),
            "embedder returned {} vectors for {} chunks",
            embeddings.len(),
            batch.len()
        );
        passages.extend(
            batch
                .into_iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| chunk.into_passage(embedding)),
        );

        let processed = passages.len();
        eprint!(
            "\r  Embedded {processed}/{total_rows} ({:.1}%)",
            processed as f64 / total_rows as f64 * 100.0
        );
    }
    if total_rows > 0 {
        eprintln!();
    }
    Ok(passages)
}

/// Run the full pipeline: read chunks, embed, write JSON lines to `output`.
pub async fn run_embed_pipeline(
    embedder: &dyn EmbeddingProvider,
    input: &Path,
    output: &Path,
) -> anyhow::Result<(EmbedStats, Vec<Passage>)> {
    let start = Instant::now();
    let passages = embed_chunks(embedder, input).await?;
    write_passages(output, &passages)
        .with_context(|| format!("writing {}", output.display()))?;

    let stats = EmbedStats {
        total_rows: passages.len(),
        elapsed_secs: start.elapsed().as_secs_f64(),
    };
    Ok((stats, passages))
}

fn read_chunks(path: &Path) -> anyhow::Result<Vec<ChunkRecord>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut chunks = Vec::new();
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let chunk: ChunkRecord = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid chunk record", path.display(), i + 1))?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

fn write_passages(path: &Path, passages: &[Passage]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(std::fs::File::create(path)?);
    for passage in passages {
        serde_json::to_writer(&mut out, passage)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
