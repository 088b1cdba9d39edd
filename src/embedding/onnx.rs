//! ONNX Runtime token encoder.
//!
//! Loads a transformer exported to ONNX together with its Hugging Face
//! `tokenizer.json` and runs batched inference, returning the last hidden
//! layer for pooling by [`super::TextEmbedder`].
//!
//! Expected model directory layout:
//!
//! ```text
//! <model_dir>/model.onnx
//! <model_dir>/tokenizer.json
//! <model_dir>/config.json      # only `hidden_size` is read
//! ```

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Tensor;
use serde::Deserialize;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

use super::{EmbeddingError, EmbeddingResult, TokenBatch, TokenEncoder};

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";
const CONFIG_FILE: &str = "config.json";
const HIDDEN_STATE_OUTPUT: &str = "last_hidden_state";

#[derive(Debug, Deserialize)]
struct ModelConfig {
    hidden_size: usize,
}

/// Transformer encoder backed by an ONNX Runtime session.
///
/// Concurrent `encode_tokens` calls queue on a single session, so batches
/// are encoded one after another.
pub struct OnnxTokenEncoder {
    /// `Session::run` needs `&mut`, so inference is serialized here
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_name: String,
    hidden_size: usize,
}

impl OnnxTokenEncoder {
    /// Load the model stored in `model_dir`.
    ///
    /// Inputs longer than `max_length` tokens are truncated.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ModelLoad` if any model file is missing or
    /// cannot be parsed
    pub fn load(model_dir: &Path, model_name: &str, max_length: usize) -> EmbeddingResult<Self> {
        let load_err = |what: &str, e: &dyn std::fmt::Display| {
            EmbeddingError::ModelLoad(format!(
                "{} for {} ({}): {}",
                what,
                model_name,
                model_dir.display(),
                e
            ))
        };

        let config_path = model_dir.join(CONFIG_FILE);
        let raw_config =
            std::fs::read_to_string(&config_path).map_err(|e| load_err("reading config.json", &e))?;
        let config: ModelConfig =
            serde_json::from_str(&raw_config).map_err(|e| load_err("parsing config.json", &e))?;

        let mut tokenizer = Tokenizer::from_file(model_dir.join(TOKENIZER_FILE))
            .map_err(|e| load_err("loading tokenizer", &e))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| load_err("configuring truncation", &e))?;
        // batches are padded by hand so the attention mask is always explicit
        tokenizer.with_padding(None);

        let session = Session::builder()
            .map_err(|e| load_err("creating session", &e))?
            .commit_from_file(model_dir.join(MODEL_FILE))
            .map_err(|e| load_err("loading model.onnx", &e))?;

        info!(
            model = model_name,
            hidden_size = config.hidden_size,
            max_length,
            "ONNX encoder loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            model_name: model_name.to_string(),
            hidden_size: config.hidden_size,
        })
    }
}

impl TokenEncoder for OnnxTokenEncoder {
    fn encode_tokens(&self, texts: &[String]) -> EmbeddingResult<TokenBatch> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EmbeddingError::Tokenization(e.to_string()))?;

        let batch = encodings.len();
        let seq_len = encodings.iter().map(|e| e.len()).max().unwrap_or(0).max(1);

        let mut input_ids = vec![0i64; batch * seq_len];
        let mut attention_mask = vec![0i64; batch * seq_len];
        let mut token_type_ids = vec![0i64; batch * seq_len];
        for (row, encoding) in encodings.iter().enumerate() {
            let base = row * seq_len;
            for (col, ((id, mask), type_id)) in encoding
                .get_ids()
                .iter()
                .zip(encoding.get_attention_mask())
                .zip(encoding.get_type_ids())
                .enumerate()
            {
                input_ids[base + col] = i64::from(*id);
                attention_mask[base + col] = i64::from(*mask);
                token_type_ids[base + col] = i64::from(*type_id);
            }
        }
        let mask_u32: Vec<u32> = attention_mask.iter().map(|&m| m as u32).collect();

        let shape = vec![batch as i64, seq_len as i64];
        let tensor_err = |e: ort::Error| EmbeddingError::Inference(format!("tensor creation error: {}", e));
        let ids_tensor = Tensor::from_array((shape.clone(), input_ids)).map_err(tensor_err)?;
        let mask_tensor = Tensor::from_array((shape.clone(), attention_mask)).map_err(tensor_err)?;
        let type_tensor = Tensor::from_array((shape, token_type_ids)).map_err(tensor_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbeddingError::Inference(format!("session lock poisoned: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
            .map_err(|e| EmbeddingError::Inference(e.to_string()))?;

        let (_name, output) = outputs
            .iter()
            .find(|(name, _)| *name == HIDDEN_STATE_OUTPUT)
            .or_else(|| outputs.iter().next())
            .ok_or_else(|| EmbeddingError::Shape("model produced no outputs".to_string()))?;

        let (out_shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbeddingError::Inference(format!("tensor extraction failed: {}", e)))?;

        if out_shape.len() != 3
            || out_shape[0] as usize != batch
            || out_shape[1] as usize != seq_len
            || out_shape[2] as usize != self.hidden_size
        {
            return Err(EmbeddingError::Shape(format!(
                "expected [{}, {}, {}], got {:?}",
                batch, seq_len, self.hidden_size, out_shape
            )));
        }

        debug!(model = %self.model_name, batch, seq_len, "ONNX inference complete");

        TokenBatch::new(data.to_vec(), mask_u32, batch, seq_len, self.hidden_size)
    }

    fn hidden_size(&self) -> usize {
        self.hidden_size
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

impl std::fmt::Debug for OnnxTokenEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxTokenEncoder")
            .field("model_name", &self.model_name)
            .field("hidden_size", &self.hidden_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = OnnxTokenEncoder::load(&dir.path().join("absent"), "absent-model", 512);
        match result {
            Err(EmbeddingError::ModelLoad(msg)) => {
                assert!(msg.contains("config.json"));
                assert!(msg.contains("absent-model"));
            }
            other => panic!("Expected ModelLoad error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_load_rejects_config_without_hidden_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"model_type": "bert"}"#).unwrap();
        let result = OnnxTokenEncoder::load(dir.path(), "bert", 512);
        assert!(matches!(result, Err(EmbeddingError::ModelLoad(msg)) if msg.contains("parsing config.json")));
    }

    #[test]
    fn test_load_requires_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), r#"{"hidden_size": 768}"#).unwrap();
        let result = OnnxTokenEncoder::load(dir.path(), "bert", 512);
        assert!(matches!(result, Err(EmbeddingError::ModelLoad(msg)) if msg.contains("tokenizer")));
    }
}
