use crate::{
    CompletionRequest, CompletionResponse, EmbedResponse, EmbeddingProvider, LlmProvider,
    ProviderError,
};

/// Registered when no real provider is configured; completion always fails.
#[derive(Debug, Default)]
pub struct NoopProvider;

#[async_trait::async_trait]
impl EmbeddingProvider for NoopProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        Ok(EmbedResponse {
            vectors: vec![vec![]; texts.len()],
        })
    }
}

#[async_trait::async_trait]
impl LlmProvider for NoopProvider {
    async fn complete(&self, _req: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
