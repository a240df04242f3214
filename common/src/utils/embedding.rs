use std::{str::FromStr, sync::Arc};

use async_trait::async_trait;
use fastembed::{EmbeddingModel, ModelTrait, TextEmbedding, TextInitOptions};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{error::AppError, utils::config::EmbeddingBackend};

/// Text → unit-norm vector of fixed dimension D (§1, §4.3). Model weights and tokenizers are
/// loaded once per process and held for its lifetime (§5 "Global state") rather than lazily
/// inside the hot path.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize;
}

/// Deterministic, model-weight-free backend used by the test suite (`SPEC_FULL.md` §C.5),
/// grounded on `eval/src/embedding.rs`'s `Hashed` variant. Hashes the input repeatedly with an
/// incrementing counter to fill `dimension` floats, then L2-normalizes.
pub struct HashedEmbeddingProvider {
    dimension: usize,
}

impl HashedEmbeddingProvider {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for HashedEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(hashed_embedding(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut values = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        for chunk in digest.chunks(4) {
            if values.len() >= dimension {
                break;
            }
            let mut buf = [0u8; 4];
            buf[..chunk.len()].copy_from_slice(chunk);
            let as_u32 = u32::from_le_bytes(buf);
            let normalized = (f64::from(as_u32) / f64::from(u32::MAX)) * 2.0 - 1.0;
            values.push(normalized as f32);
        }
        counter += 1;
    }
    l2_normalize(&mut values);
    values
}

fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// Local ONNX-backed embedding model, grounded on `eval/src/embedding.rs`'s `FastEmbed`
/// variant and the teacher's use of `fastembed` for its own retrieval pool. Wrapped in a
/// `Mutex` because `TextEmbedding::embed` takes `&mut self`.
pub struct FastEmbedProvider {
    model: Arc<Mutex<TextEmbedding>>,
    dimension: usize,
}

impl FastEmbedProvider {
    pub async fn try_new(model_code: Option<&str>) -> Result<Self, AppError> {
        let model_name = match model_code {
            Some(code) => EmbeddingModel::from_str(code)
                .map_err(|err| AppError::Validation(format!("unknown embedding model: {err}")))?,
            None => EmbeddingModel::default(),
        };

        let options = TextInitOptions::new(model_name.clone()).with_show_download_progress(true);
        let model_for_task = model_name.clone();

        let (model, dimension) = tokio::task::spawn_blocking(move || {
            let model = TextEmbedding::try_new(options)
                .map_err(|err| AppError::InternalError(format!("fastembed init failed: {err}")))?;
            let info = EmbeddingModel::get_model_info(&model_for_task).ok_or_else(|| {
                AppError::InternalError("fastembed model metadata missing".to_string())
            })?;
            Ok::<_, AppError>((model, info.dim))
        })
        .await??;

        info!(model = %model_name.to_string(), dimension, "FastEmbed model loaded");

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AppError> {
        let mut guard = self.model.lock().await;
        let mut embeddings = guard
            .embed(vec![text.to_owned()], None)
            .map_err(|err| AppError::InternalError(format!("fastembed embed failed: {err}")))?;
        embeddings
            .pop()
            .ok_or_else(|| AppError::InternalError("fastembed returned no embedding".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AppError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let mut guard = self.model.lock().await;
        debug!(batch_size = texts.len(), "Embedding batch via fastembed");
        guard
            .embed(texts.to_vec(), None)
            .map_err(|err| AppError::InternalError(format!("fastembed embed failed: {err}")))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Builds the configured backend (§C.5 of `SPEC_FULL.md`).
pub async fn build_embedding_provider(
    backend: EmbeddingBackend,
    dimension: usize,
) -> Result<Arc<dyn EmbeddingProvider>, AppError> {
    match backend {
        EmbeddingBackend::Hashed => Ok(Arc::new(HashedEmbeddingProvider::new(dimension))),
        EmbeddingBackend::FastEmbed => Ok(Arc::new(FastEmbedProvider::try_new(None).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashed_embeddings_are_deterministic_and_unit_norm() {
        let provider = HashedEmbeddingProvider::new(16);
        let a = provider.embed("data protection policy").await.unwrap();
        let b = provider.embed("data protection policy").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn hashed_embeddings_differ_for_different_text() {
        let provider = HashedEmbeddingProvider::new(8);
        let a = provider.embed("alpha").await.unwrap();
        let b = provider.embed("beta").await.unwrap();
        assert_ne!(a, b);
    }
}
