//! Text embedding generation.
//!
//! This module turns batches of text into fixed-dimension dense vectors.
//! A pretrained transformer sits behind the [`TokenEncoder`] trait and yields
//! token-level hidden states; [`TextEmbedder`] pools them into one vector per
//! input with masked mean pooling and optionally L2-normalizes the result.
//!
//! The abstraction allows the system to swap model backends without changing
//! the pooling, batching or ranking logic.

pub mod onnx;
pub mod registry;

use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

pub use registry::{EmbedderRegistry, EncoderLoader, OnnxModelLoader};

/// Lower bound for the mean-pooling denominator.
pub const POOLING_EPSILON: f32 = 1e-9;

/// Lower bound for the norm used in L2 normalization.
pub const NORM_EPSILON: f32 = 1e-12;

/// Errors that can occur during embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The backing model or tokenizer could not be loaded
    #[error("Model load failed: {0}")]
    ModelLoad(String),

    /// The tokenizer rejected the input
    #[error("Tokenization failed: {0}")]
    Tokenization(String),

    /// The model failed while running inference
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Model output did not have the expected layout
    #[error("Unexpected model output shape: {0}")]
    Shape(String),
}

/// Result type for embedding operations.
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Token-level model output for one batch of inputs.
///
/// `hidden_states` is laid out as `[batch][seq_len][hidden_size]` and
/// `attention_mask` as `[batch][seq_len]`, both row-major. A mask value of
/// zero marks a padding position.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenBatch {
    hidden_states: Vec<f32>,
    attention_mask: Vec<u32>,
    batch_size: usize,
    seq_len: usize,
    hidden_size: usize,
}

impl TokenBatch {
    /// Wrap raw model output, checking that both buffers match the shape.
    pub fn new(
        hidden_states: Vec<f32>,
        attention_mask: Vec<u32>,
        batch_size: usize,
        seq_len: usize,
        hidden_size: usize,
    ) -> EmbeddingResult<Self> {
        if hidden_states.len() != batch_size * seq_len * hidden_size {
            return Err(EmbeddingError::Shape(format!(
                "expected {} hidden values for [{}, {}, {}], got {}",
                batch_size * seq_len * hidden_size,
                batch_size,
                seq_len,
                hidden_size,
                hidden_states.len()
            )));
        }
        if attention_mask.len() != batch_size * seq_len {
            return Err(EmbeddingError::Shape(format!(
                "expected {} mask values for [{}, {}], got {}",
                batch_size * seq_len,
                batch_size,
                seq_len,
                attention_mask.len()
            )));
        }
        Ok(Self {
            hidden_states,
            attention_mask,
            batch_size,
            seq_len,
            hidden_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}

/// Trait for pretrained token encoders.
///
/// Implementations run a transformer over a batch of texts and return the
/// last hidden layer for every token together with the attention mask.
/// Inference is blocking and must be safe to call concurrently from several
/// threads; the model is never mutated after loading.
pub trait TokenEncoder: Send + Sync {
    /// Encode a batch of texts into token-level hidden states.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if tokenization or inference fails
    fn encode_tokens(&self, texts: &[String]) -> EmbeddingResult<TokenBatch>;

    /// Width of the hidden states (and of pooled embeddings).
    fn hidden_size(&self) -> usize;

    /// Identifier of the backing model.
    fn model_name(&self) -> &str;
}

/// Average token vectors per input, counting only non-padding positions.
///
/// The denominator is the number of real tokens, floored at
/// [`POOLING_EPSILON`], so an all-padding input pools to a zero vector.
pub fn mean_pool(batch: &TokenBatch) -> Vec<Vec<f32>> {
    let hidden = batch.hidden_size;
    let seq_len = batch.seq_len;
    (0..batch.batch_size)
        .map(|b| {
            let mut summed = vec![0.0f32; hidden];
            let mut count = 0.0f32;
            for s in 0..seq_len {
                let mask = batch.attention_mask[b * seq_len + s] as f32;
                if mask == 0.0 {
                    continue;
                }
                count += mask;
                let offset = (b * seq_len + s) * hidden;
                let token = &batch.hidden_states[offset..offset + hidden];
                for (acc, value) in summed.iter_mut().zip(token) {
                    *acc += value * mask;
                }
            }
            let denom = count.max(POOLING_EPSILON);
            summed.iter_mut().for_each(|v| *v /= denom);
            summed
        })
        .collect()
}

/// Scale `vector` to unit Euclidean length in place.
///
/// The norm is clamped to [`NORM_EPSILON`] so a zero vector stays zero.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm.max(NORM_EPSILON);
    vector.iter_mut().for_each(|v| *v /= denom);
}

/// Batched text-to-vector embedder over a shared token encoder.
///
/// Cloning is cheap; clones share the same loaded model.
#[derive(Clone)]
pub struct TextEmbedder {
    encoder: Arc<dyn TokenEncoder>,
}

impl TextEmbedder {
    pub fn new(encoder: Arc<dyn TokenEncoder>) -> Self {
        Self { encoder }
    }

    /// Embedding dimensionality of the backing model.
    pub fn dimension(&self) -> usize {
        self.encoder.hidden_size()
    }

    pub fn model_name(&self) -> &str {
        self.encoder.model_name()
    }

    /// Embed `texts`, returning one vector per input in input order.
    ///
    /// Inputs are split into contiguous batches of `batch_size` (zero is
    /// treated as one) and handed to the encoder from the rayon pool. Whether
    /// batches actually overlap depends on the encoder; the ONNX backend runs
    /// one batch at a time. An empty input yields
    /// an empty result. With `normalize`, every vector is scaled to unit
    /// length.
    ///
    /// # Errors
    /// Returns `EmbeddingError` if any batch fails to encode
    pub fn encode<S>(
        &self,
        texts: &[S],
        batch_size: usize,
        normalize: bool,
    ) -> EmbeddingResult<Vec<Vec<f32>>>
    where
        S: AsRef<str> + Sync,
    {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let batch_size = batch_size.max(1);

        let batches = texts
            .par_chunks(batch_size)
            .map(|chunk| self.encode_batch(chunk, normalize))
            .collect::<EmbeddingResult<Vec<_>>>()?;

        Ok(batches.into_iter().flatten().collect())
    }

    fn encode_batch<S: AsRef<str>>(
        &self,
        chunk: &[S],
        normalize: bool,
    ) -> EmbeddingResult<Vec<Vec<f32>>> {
        let owned: Vec<String> = chunk.iter().map(|t| t.as_ref().to_string()).collect();
        let tokens = self.encoder.encode_tokens(&owned)?;
        if tokens.batch_size() != owned.len() {
            return Err(EmbeddingError::Shape(format!(
                "encoder returned {} rows for {} inputs",
                tokens.batch_size(),
                owned.len()
            )));
        }

        let mut pooled = mean_pool(&tokens);
        if normalize {
            pooled.iter_mut().for_each(|v| l2_normalize(v));
        }
        debug!(
            model = self.encoder.model_name(),
            inputs = owned.len(),
            "Embedded batch"
        );
        Ok(pooled)
    }
}

impl std::fmt::Debug for TextEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextEmbedder")
            .field("model_name", &self.encoder.model_name())
            .field("dimension", &self.encoder.hidden_size())
            .finish()
    }
}
