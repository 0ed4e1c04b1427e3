//! Command-line arguments.
//!
//! Every flag falls back to an environment variable, then to the default in
//! [`risklens_core::Settings`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use risklens_ai::Selection;
use risklens_core::{EmbeddingBackend, MetadataFilter, Settings};

/// Zero-shot risk classification and diversity-aware retrieval over filings.
#[derive(Parser, Debug)]
#[command(name = "risklens", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub scorer: ScorerArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    #[command(flatten)]
    pub retrieval: RetrievalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Classify passages against the risk taxonomy.
    Classify {
        /// Passage text; repeat for several passages.
        #[arg(long = "text", required = true)]
        texts: Vec<String>,

        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Retrieve relevant, diverse passages for a query.
    Retrieve {
        query: String,

        #[arg(short, long, default_value_t = 8)]
        k: usize,

        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Retrieve passages and classify each, grouping citations by label.
    Analyze {
        query: String,

        #[arg(short, long, default_value_t = 12)]
        k: usize,

        /// Passages to classify out of those retrieved.
        #[arg(long, default_value_t = crate::analyze::DEFAULT_CLASSIFY_LIMIT)]
        classify_limit: usize,

        #[command(flatten)]
        filter: FilterArgs,

        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Embed chunked passages into a searchable index.
    Embed {
        /// JSON-lines file of chunks (`chunk_id`, `text`, metadata).
        input: PathBuf,

        /// JSON-lines file to write embedded passages to.
        #[arg(short, long, default_value = "data/passages.jsonl")]
        output: PathBuf,
    },
    /// Print the label taxonomy with normalized keys.
    Taxonomy,
}

#[derive(Args, Debug)]
pub struct ScorerArgs {
    /// Directory containing the NLI `model.onnx` and `tokenizer.json`.
    #[arg(long, env = "ZSL_MODEL_DIR", global = true)]
    pub model_dir: Option<PathBuf>,

    /// Maximum tokens per (passage, hypothesis) pair.
    #[arg(long, env = "ZSL_MAX_LEN", global = true)]
    pub max_len: Option<usize>,

    /// Labels scored per inference call.
    #[arg(long, env = "ZSL_LABEL_BATCH", global = true)]
    pub label_batch: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    Onnx,
    Hosted,
}

#[derive(Args, Debug)]
pub struct EmbeddingArgs {
    #[arg(long, value_enum, env = "EMBEDDING_BACKEND", global = true)]
    pub embedding_backend: Option<BackendKind>,

    /// Sentence-transformers model directory for the `onnx` backend.
    #[arg(long, env = "EMBEDDING_MODEL_DIR", global = true)]
    pub embedding_model_dir: Option<PathBuf>,

    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    #[arg(long, env = "EMBEDDING_API_BASE", global = true)]
    pub embedding_api_base: Option<String>,

    #[arg(long, env = "EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true, global = true)]
    pub embedding_api_key: Option<String>,
}

#[derive(Args, Debug)]
pub struct RetrievalArgs {
    /// MMR relevance/diversity trade-off in [0, 1].
    #[arg(long, env = "MMR_LAMBDA", global = true)]
    pub lambda: Option<f32>,

    /// Candidates fetched before MMR re-ranking.
    #[arg(long, env = "MMR_FETCH_K", global = true)]
    pub fetch_k: Option<usize>,

    /// LanceDB database directory.
    #[arg(long, env = "RISKLENS_DB", global = true)]
    pub db: Option<PathBuf>,

    /// JSON-lines file of embedded passages, searched in memory.
    #[arg(long, env = "RISKLENS_PASSAGES", global = true)]
    pub passages: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FilterArgs {
    #[arg(long)]
    pub issuer: Option<String>,

    #[arg(long)]
    pub year: Option<String>,

    #[arg(long)]
    pub section: Option<String>,
}

impl FilterArgs {
    pub fn to_filter(&self) -> Option<MetadataFilter> {
        let mut filter = MetadataFilter::new();
        if let Some(issuer) = &self.issuer {
            filter = filter.issuer(issuer.clone());
        }
        if let Some(year) = &self.year {
            filter = filter.fiscal_year(year.clone());
        }
        if let Some(section) = &self.section {
            filter = filter.section(section.clone());
        }
        (!filter.is_empty()).then_some(filter)
    }
}

#[derive(Args, Debug)]
pub struct SelectionArgs {
    /// Labels returned per passage.
    #[arg(long, default_value_t = 3, conflicts_with = "threshold")]
    pub top_k: usize,

    /// Return every label scoring at least this probability instead of top-k.
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Cap on labels returned in threshold mode.
    #[arg(long, requires = "threshold")]
    pub max_labels: Option<usize>,
}

impl SelectionArgs {
    pub fn selection(&self) -> Selection {
        match self.threshold {
            Some(threshold) => Selection::Threshold {
                threshold,
                max_labels: self.max_labels,
            },
            None => Selection::TopK(self.top_k),
        }
    }
}

impl Cli {
    /// Merge flags and environment over the defaults.
    pub fn settings(&self) -> Settings {
        let mut settings = Settings::default();

        if let Some(dir) = &self.scorer.model_dir {
            settings.scorer.model_dir = dir.clone();
        }
        if let Some(max_len) = self.scorer.max_len {
            settings.scorer.max_length = max_len;
        }
        if let Some(batch) = self.scorer.label_batch {
            settings.scorer.batch_size = batch;
        }

        if let Some(lambda) = self.retrieval.lambda {
            settings.retrieval.lambda = lambda;
        }
        settings.retrieval.fetch_k = self.retrieval.fetch_k;

        let e = &self.embedding;
        settings.embedding.backend = match e.embedding_backend.unwrap_or(BackendKind::Onnx) {
            BackendKind::Onnx => match &e.embedding_model_dir {
                Some(dir) => EmbeddingBackend::Onnx {
                    model_dir: dir.clone(),
                },
                None => EmbeddingBackend::default(),
            },
            BackendKind::Hosted => EmbeddingBackend::Hosted {
                base_url: e
                    .embedding_api_base
                    .clone()
                    .unwrap_or_else(|| "https://api.openai.com/v1".into()),
                model: e
                    .embedding_model
                    .clone()
                    .unwrap_or_else(|| "text-embedding-3-small".into()),
                api_key: e.embedding_api_key.clone(),
            },
        };

        settings
    }
}
