//! ONNX Runtime backend for MNLI-style sequence-pair classifiers.
//!
//! Works with exports such as `facebook/bart-large-mnli` or
//! `cross-encoder/nli-*`. The model directory must contain `model.onnx` and
//! `tokenizer.json`; an optional `config.json` with `id2label` fixes the
//! position of the contradiction/neutral/entailment logits.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use risklens_core::ModelUnavailable;
use tokenizers::Tokenizer;
use tracing::info;

use crate::cache::ModelCache;
use crate::entailment::NliModel;
use crate::onnx::{EncoderSession, configure_pair_tokenizer, encode_batch, load_tokenizer, model_files};

static NLI_MODELS: Lazy<ModelCache<(PathBuf, usize), OnnxNli>> = Lazy::new(ModelCache::new);

/// Position of `[contradiction, neutral, entailment]` in the model's logits.
type LabelOrder = [usize; 3];

const DEFAULT_ORDER: LabelOrder = [0, 1, 2];

/// NLI sequence-pair classifier on ONNX Runtime.
pub struct OnnxNli {
    encoder: EncoderSession,
    tokenizer: Tokenizer,
    order: LabelOrder,
}

impl OnnxNli {
    /// Load a model, truncating pairs to `max_length` tokens.
    ///
    /// Truncation only ever removes premise tokens; the hypothesis is kept
    /// whole.
    pub fn load(model_dir: &Path, max_length: usize) -> Result<Self, ModelUnavailable> {
        load_inner(model_dir, max_length).map_err(|e| ModelUnavailable {
            path: model_dir.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    /// Process-wide shared instance for `(model_dir, max_length)`, loaded on
    /// first use.
    pub fn shared(model_dir: &Path, max_length: usize) -> Result<Arc<Self>, ModelUnavailable> {
        NLI_MODELS.get_or_load(&(model_dir.to_path_buf(), max_length), || {
            Self::load(model_dir, max_length)
        })
    }
}

fn load_inner(model_dir: &Path, max_length: usize) -> anyhow::Result<OnnxNli> {
    let (model_path, tokenizer_path) = model_files(model_dir)?;
    let encoder = EncoderSession::open(&model_path)?;

    let mut tokenizer = load_tokenizer(&tokenizer_path)?;
    configure_pair_tokenizer(&mut tokenizer, max_length)?;

    let order = match std::fs::read_to_string(model_dir.join("config.json")) {
        Ok(raw) => label_order(&raw)?,
        Err(_) => DEFAULT_ORDER,
    };

    info!(
        model = %model_path.display(),
        max_length,
        feeds_token_type_ids = encoder.feeds_token_type_ids(),
        ?order,
        "loaded NLI model"
    );
    Ok(OnnxNli {
        encoder,
        tokenizer,
        order,
    })
}

/// Read the logit positions from a HuggingFace `config.json`.
///
/// Falls back to `[0, 1, 2]` when the config has no `id2label`.
fn label_order(config_json: &str) -> anyhow::Result<LabelOrder> {
    let config: serde_json::Value = serde_json::from_str(config_json)?;
    let Some(id2label) = config.get("id2label").and_then(|v| v.as_object()) else {
        return Ok(DEFAULT_ORDER);
    };

    let mut order = [usize::MAX; 3];
    for (id, label) in id2label {
        let id: usize = id.parse()?;
        let slot = match label.as_str().map(str::to_ascii_lowercase).as_deref() {
            Some("contradiction") => 0,
            Some("neutral") => 1,
            Some("entailment") => 2,
            other => anyhow::bail!("unexpected NLI label {other:?} in config.json"),
        };
        order[slot] = id;
    }
    anyhow::ensure!(
        order.iter().all(|&i| i < 3),
        "config.json id2label must name contradiction, neutral and entailment"
    );
    Ok(order)
}

impl NliModel for OnnxNli {
    fn infer(&self, pairs: &[(&str, &str)]) -> anyhow::Result<Vec<[f32; 3]>> {
        if pairs.is_empty() {
            return Ok(vec![]);
        }

        let batch_size = pairs.len();
        let batch = encode_batch(&self.tokenizer, pairs.to_vec())?;
        let (dims, logits) = self.encoder.run(&batch)?;

        // Logits: [batch_size, 3].
        anyhow::ensure!(
            dims.len() == 2 && dims[0] as usize == batch_size && dims[1] == 3,
            "unexpected logits shape: {dims:?}, expected [{batch_size}, 3]"
        );

        let [c, n, e] = self.order;
        Ok(logits
            .chunks_exact(3)
            .map(|row| [row[c], row[n], row[e]])
            .collect())
    }
}
