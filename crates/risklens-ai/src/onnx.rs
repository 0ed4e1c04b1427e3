//! ONNX Runtime plumbing shared by the transformer encoders: model file
//! lookup, tokenizer truncation and padding, and session execution.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{EncodeInput, PaddingParams, Tokenizer, TruncationParams, TruncationStrategy};

/// Pad tokens looked up when `tokenizer.json` configures no padding.
/// BART and RoBERTa vocabularies use `<pad>`, BERT uses `[PAD]`.
const PAD_TOKENS: [&str; 2] = ["<pad>", "[PAD]"];

/// Paths of `model.onnx` and `tokenizer.json` inside `model_dir`.
pub(crate) fn model_files(model_dir: &Path) -> anyhow::Result<(PathBuf, PathBuf)> {
    let model_path = model_dir.join("model.onnx");
    let tokenizer_path = model_dir.join("tokenizer.json");

    anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
    anyhow::ensure!(
        tokenizer_path.exists(),
        "tokenizer.json not found in {model_dir:?}"
    );
    Ok((model_path, tokenizer_path))
}

pub(crate) fn load_tokenizer(path: &Path) -> anyhow::Result<Tokenizer> {
    Tokenizer::from_file(path).map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))
}

/// Truncate single texts to `max_length` tokens and pad batches.
pub(crate) fn configure_tokenizer(tokenizer: &mut Tokenizer, max_length: usize) -> anyhow::Result<()> {
    configure(tokenizer, max_length, TruncationStrategy::LongestFirst)
}

/// Truncate (premise, hypothesis) pairs to `max_length` tokens by removing
/// premise tokens only. A pair whose hypothesis alone exceeds the limit fails
/// to encode.
pub(crate) fn configure_pair_tokenizer(
    tokenizer: &mut Tokenizer,
    max_length: usize,
) -> anyhow::Result<()> {
    configure(tokenizer, max_length, TruncationStrategy::OnlyFirst)
}

fn configure(
    tokenizer: &mut Tokenizer,
    max_length: usize,
    strategy: TruncationStrategy,
) -> anyhow::Result<()> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            strategy,
            ..Default::default()
        }))
        .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

    if tokenizer.get_padding().is_none() {
        let padding = padding_for(tokenizer);
        tokenizer.with_padding(Some(padding));
    }
    Ok(())
}

fn padding_for(tokenizer: &Tokenizer) -> PaddingParams {
    PAD_TOKENS
        .iter()
        .find_map(|&token| {
            tokenizer.token_to_id(token).map(|pad_id| PaddingParams {
                pad_id,
                pad_token: token.to_string(),
                ..Default::default()
            })
        })
        .unwrap_or_default()
}

/// Tokenized batch as flat `[batch_size, seq_len]` tensors.
pub(crate) struct EncodedBatch {
    pub batch_size: usize,
    pub seq_len: usize,
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

pub(crate) fn encode_batch<'s, E>(tokenizer: &Tokenizer, inputs: Vec<E>) -> anyhow::Result<EncodedBatch>
where
    E: Into<EncodeInput<'s>> + Send,
{
    let batch_size = inputs.len();
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| anyhow::anyhow!("tokenize: {e}"))?;

    let seq_len = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0);

    let mut input_ids = vec![0i64; batch_size * seq_len];
    let mut attention_mask = vec![0i64; batch_size * seq_len];
    let mut token_type_ids = vec![0i64; batch_size * seq_len];

    for (i, encoding) in encodings.iter().enumerate() {
        let offset = i * seq_len;
        for (j, &id) in encoding.get_ids().iter().enumerate() {
            input_ids[offset + j] = id as i64;
        }
        for (j, &mask) in encoding.get_attention_mask().iter().enumerate() {
            attention_mask[offset + j] = mask as i64;
        }
        for (j, &tid) in encoding.get_type_ids().iter().enumerate() {
            token_type_ids[offset + j] = tid as i64;
        }
    }

    Ok(EncodedBatch {
        batch_size,
        seq_len,
        input_ids,
        attention_mask,
        token_type_ids,
    })
}

/// An ONNX encoder session, serialized behind a mutex.
pub(crate) struct EncoderSession {
    session: Mutex<Session>,
    feeds_token_type_ids: bool,
    output_dim: Option<usize>,
}

impl EncoderSession {
    pub fn open(model_path: &Path) -> anyhow::Result<Self> {
        let session = Session::builder()?.commit_from_file(model_path)?;
        // BART exports take no segment ids; BERT-family encoders do.
        let feeds_token_type_ids = session
            .inputs()
            .iter()
            .any(|input| input.name() == "token_type_ids");
        let output_dim = infer_dim(session.outputs()[0].dtype());

        Ok(Self {
            session: Mutex::new(session),
            feeds_token_type_ids,
            output_dim,
        })
    }

    pub fn feeds_token_type_ids(&self) -> bool {
        self.feeds_token_type_ids
    }

    /// Last dimension of the first output, if the model declares it statically.
    pub fn output_dim(&self) -> Option<usize> {
        self.output_dim
    }

    /// Run the model and copy out its first output as `(shape, data)`.
    pub fn run(&self, batch: &EncodedBatch) -> anyhow::Result<(Vec<i64>, Vec<f32>)> {
        let shape = [batch.batch_size as i64, batch.seq_len as i64];
        let ids_tensor = Tensor::from_array((shape, batch.input_ids.clone().into_boxed_slice()))?;
        let mask_tensor =
            Tensor::from_array((shape, batch.attention_mask.clone().into_boxed_slice()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow::anyhow!("ONNX session lock poisoned"))?;

        let outputs = if self.feeds_token_type_ids {
            let type_tensor =
                Tensor::from_array((shape, batch.token_type_ids.clone().into_boxed_slice()))?;
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])?
        } else {
            session.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            ])?
        };

        let (output_shape, data) = outputs[0].try_extract_tensor::<f32>()?;
        let dims: &[i64] = output_shape;
        Ok((dims.to_vec(), data.to_vec()))
    }
}

fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
