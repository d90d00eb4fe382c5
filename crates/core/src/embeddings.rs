use providers::{EmbeddingProvider, ProviderError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("provider returned {got} vectors for {expected} inputs")]
    CountMismatch { expected: usize, got: usize },
}

/// Embeds `texts` in batches of at most `batch_size`, preserving input order.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut vectors = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        let resp = provider.embed(batch).await?;
        if resp.vectors.len() != batch.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: batch.len(),
                got: resp.vectors.len(),
            });
        }
        vectors.extend(resp.vectors);
    }
    Ok(vectors)
}

pub async fn embed_one(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, EmbeddingError> {
    let resp = provider.embed(&[text.to_string()]).await?;
    let got = resp.vectors.len();
    match <[Vec<f32>; 1]>::try_from(resp.vectors) {
        Ok([vector]) => Ok(vector),
        Err(_) => Err(EmbeddingError::CountMismatch { expected: 1, got }),
    }
}
