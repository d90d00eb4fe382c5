//! Deterministic in-process providers for tests and offline runs.
//!
//! `MockLlm` replays a script of completions in order; `MockEmbedder` looks
//! vectors up in a table and falls back to a character-hash embedding.

use crate::{
    CompletionRequest, CompletionResponse, EmbedResponse, EmbeddingProvider, LlmProvider,
    ProviderError,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Fail(String),
}

/// Completion provider that answers from a fixed script.
///
/// Once the script is exhausted the default reply (if any) is returned for
/// every further call.
#[derive(Clone, Default)]
pub struct MockLlm {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    default_reply: Option<String>,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, content: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Reply(content.into()));
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Scripted::Fail(message.into()));
        self
    }

    pub fn with_default_reply(mut self, content: impl Into<String>) -> Self {
        self.default_reply = Some(content.into());
        self
    }

    /// Requests seen so far, in call order.
    pub fn calls(&self) -> Vec<CompletionRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockLlm {
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        self.calls.lock().unwrap().push(req.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(content)) => Ok(CompletionResponse { content }),
            Some(Scripted::Fail(message)) => Err(ProviderError::RequestFailed(message)),
            None => self
                .default_reply
                .clone()
                .map(|content| CompletionResponse { content })
                .ok_or_else(|| ProviderError::RequestFailed("mock script exhausted".into())),
        }
    }
}

/// Embedding provider backed by a lookup table.
#[derive(Clone)]
pub struct MockEmbedder {
    dimension: usize,
    table: Arc<HashMap<String, Vec<f32>>>,
    failing: Arc<HashSet<String>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: Arc::new(HashMap::new()),
            failing: Arc::new(HashSet::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Pins the vector returned for an exact input text.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Arc::make_mut(&mut self.table).insert(text.into(), vector);
        self
    }

    /// Any request containing this text fails with `RequestFailed`.
    pub fn with_failure_on(mut self, text: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.failing).insert(text.into());
        self
    }

    /// Batches seen so far, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Character-hash embedding, normalized to unit length.
    pub fn hashed(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0f32; dimension];
        if dimension == 0 {
            return vec;
        }
        for (i, c) in text.chars().enumerate() {
            vec[(c as usize + i) % dimension] += 0.1;
        }
        let magnitude = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        self.calls.lock().unwrap().push(texts.to_vec());
        if let Some(bad) = texts.iter().find(|t| self.failing.contains(*t)) {
            return Err(ProviderError::RequestFailed(format!(
                "simulated embedding failure for {bad:?}"
            )));
        }
        let vectors = texts
            .iter()
            .map(|t| {
                self.table
                    .get(t)
                    .cloned()
                    .unwrap_or_else(|| Self::hashed(t, self.dimension))
            })
            .collect();
        Ok(EmbedResponse { vectors })
    }
}
