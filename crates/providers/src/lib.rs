//! Provider abstractions for text completion and embeddings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod noop;
pub mod openai;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("not implemented")]
    NotImplemented,
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("provider returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no {kind} provider named {name:?} (registered: {available:?})")]
    UnknownProvider {
        kind: &'static str,
        name: String,
        available: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub vectors: Vec<Vec<f32>>,
}

/// A single system + user exchange sent to a completion model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    /// 0.0 asks the model for its most deterministic output.
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
}

#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns one vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError>;
}

#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, ProviderError>;
}

/// Named providers for each role, plus the name used when a caller has none.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    embeddings: HashMap<String, Arc<dyn EmbeddingProvider>>,
    llms: HashMap<String, Arc<dyn LlmProvider>>,
    pub preferred_embedding: Option<String>,
    pub preferred_llm: Option<String>,
}

fn resolve<P: ?Sized>(
    kind: &'static str,
    table: &HashMap<String, Arc<P>>,
    requested: Option<&str>,
    preferred: Option<&str>,
) -> Result<Arc<P>, ProviderError> {
    let Some(name) = requested.or(preferred) else {
        return Err(ProviderError::UnknownProvider {
            kind,
            name: String::new(),
            available: sorted_names(table),
        });
    };
    table
        .get(name)
        .cloned()
        .ok_or_else(|| ProviderError::UnknownProvider {
            kind,
            name: name.to_string(),
            available: sorted_names(table),
        })
}

fn sorted_names<P: ?Sized>(table: &HashMap<String, Arc<P>>) -> Vec<String> {
    let mut names: Vec<String> = table.keys().cloned().collect();
    names.sort();
    names
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding(mut self, name: &str, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings.insert(name.to_string(), provider);
        self
    }

    pub fn with_llm(mut self, name: &str, provider: Arc<dyn LlmProvider>) -> Self {
        self.llms.insert(name.to_string(), provider);
        self
    }

    pub fn set_preferred_embedding(mut self, name: &str) -> Self {
        self.preferred_embedding = Some(name.to_string());
        self
    }

    pub fn set_preferred_llm(mut self, name: &str) -> Self {
        self.preferred_llm = Some(name.to_string());
        self
    }

    /// Looks up `name`, or the preferred embedding provider when `name` is `None`.
    pub fn embedding(
        &self,
        name: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
        resolve(
            "embedding",
            &self.embeddings,
            name,
            self.preferred_embedding.as_deref(),
        )
    }

    pub fn llm(&self, name: Option<&str>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        resolve("completion", &self.llms, name, self.preferred_llm.as_deref())
    }
}
