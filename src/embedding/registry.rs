//! Lazily loaded, shared embedding models.
//!
//! Loading a transformer is expensive, so each model is loaded at most once
//! per process and then shared read-only between requests. The registry is
//! created by the composition root and handed to the search engine.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::info;

use super::onnx::OnnxTokenEncoder;
use super::{EmbeddingError, EmbeddingResult, TextEmbedder, TokenEncoder};

/// Loads a token encoder for a model identifier.
///
/// Called on the blocking thread pool; may take seconds.
pub trait EncoderLoader: Send + Sync + 'static {
    fn load(&self, model_id: &str) -> EmbeddingResult<Arc<dyn TokenEncoder>>;
}

/// Resolves model identifiers to ONNX model directories under a root.
///
/// `microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract` is looked up in
/// `<model_root>/microsoft/BiomedNLP-PubMedBERT-base-uncased-abstract/`.
/// Identifiers must be relative paths made of plain segments.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model_root: PathBuf,
    max_length: usize,
}

impl OnnxModelLoader {
    pub fn new(model_root: impl Into<PathBuf>, max_length: usize) -> Self {
        Self {
            model_root: model_root.into(),
            max_length,
        }
    }
}

impl EncoderLoader for OnnxModelLoader {
    fn load(&self, model_id: &str) -> EmbeddingResult<Arc<dyn TokenEncoder>> {
        let confined = Path::new(model_id)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if model_id.trim().is_empty() || !confined {
            return Err(EmbeddingError::ModelLoad(format!(
                "invalid model identifier: {:?}",
                model_id
            )));
        }
        let dir = self.model_root.join(model_id);
        let encoder = OnnxTokenEncoder::load(&dir, model_id, self.max_length)?;
        Ok(Arc::new(encoder))
    }
}

type Slot = Arc<OnceCell<Arc<TextEmbedder>>>;

/// Per-model, initialize-once cache of [`TextEmbedder`]s.
///
/// Concurrent first requests for the same model wait on a single load.
/// A failed load is not cached and leaves no entry behind, so a later
/// request retries it.
pub struct EmbedderRegistry {
    loader: Arc<dyn EncoderLoader>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl EmbedderRegistry {
    pub fn new(loader: Arc<dyn EncoderLoader>) -> Self {
        Self {
            loader,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Get the embedder for `model_id`, loading it on first use.
    ///
    /// # Errors
    /// Returns `EmbeddingError::ModelLoad` if the model cannot be loaded
    pub async fn get(&self, model_id: &str) -> EmbeddingResult<Arc<TextEmbedder>> {
        let slot = {
            let mut slots = self.slots.lock().await;
            Arc::clone(slots.entry(model_id.to_string()).or_default())
        };

        let loaded = slot
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                let id = model_id.to_string();
                let encoder = tokio::task::spawn_blocking(move || loader.load(&id))
                    .await
                    .map_err(|e| EmbeddingError::ModelLoad(format!("loader task failed: {}", e)))??;
                info!(
                    model = model_id,
                    dimension = encoder.hidden_size(),
                    "Embedding model ready"
                );
                Ok::<_, EmbeddingError>(Arc::new(TextEmbedder::new(encoder)))
            })
            .await;

        match loaded {
            Ok(embedder) => Ok(Arc::clone(embedder)),
            Err(e) => {
                let mut slots = self.slots.lock().await;
                if slots.get(model_id).is_some_and(|s| Arc::ptr_eq(s, &slot) && !s.initialized()) {
                    slots.remove(model_id);
                }
                Err(e)
            }
        }
    }

    /// Identifiers of the models loaded so far.
    pub async fn loaded_models(&self) -> Vec<String> {
        let slots = self.slots.lock().await;
        let mut ids: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.initialized())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
