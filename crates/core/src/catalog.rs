//! Controlled vocabulary of finding models and their precomputed embeddings.

use crate::embeddings::{self, EmbeddingError};
use providers::EmbeddingProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use storage::StorageError;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FindingModel {
    /// Canonical identifier; legacy records may not have one.
    #[serde(rename = "oifm_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub description: String,
}

impl FindingModel {
    /// Text submitted to the embedding provider for this model.
    pub fn embedding_text(&self) -> String {
        format!("{}. {}", self.name, self.description)
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read finding models: {0}")]
    Storage(#[from] StorageError),
    #[error("no finding models in {0}")]
    Empty(PathBuf),
    #[error("duplicate finding model id {0}")]
    DuplicateId(String),
    #[error("failed to embed finding models: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("finding model {index} has a {got}-dimensional embedding, expected {expected}")]
    Dimension {
        index: usize,
        expected: usize,
        got: usize,
    },
    #[error("embedding provider returned empty vectors")]
    EmptyVector,
}

/// Reads the catalog definition file (a single JSON array).
pub fn load_models(path: impl AsRef<Path>) -> Result<Vec<FindingModel>, CatalogError> {
    let path = path.as_ref();
    let models: Vec<FindingModel> = storage::read_json(path)?;
    if models.is_empty() {
        return Err(CatalogError::Empty(path.to_path_buf()));
    }
    let mut seen = HashSet::new();
    for id in models.iter().filter_map(|m| m.id.as_deref()) {
        if !seen.insert(id) {
            return Err(CatalogError::DuplicateId(id.to_string()));
        }
    }
    Ok(models)
}

/// Finding models paired with their embeddings, index for index.
///
/// Built once per mapping run and only read afterwards.
#[derive(Debug, Clone)]
pub struct Catalog {
    models: Vec<FindingModel>,
    embeddings: Vec<Vec<f32>>,
}

impl Catalog {
    /// Pairs models with precomputed vectors, checking they agree in count and size.
    pub fn from_parts(
        models: Vec<FindingModel>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, CatalogError> {
        if embeddings.len() != models.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: models.len(),
                got: embeddings.len(),
            }
            .into());
        }
        if let Some(first) = embeddings.first() {
            if first.is_empty() {
                return Err(CatalogError::EmptyVector);
            }
            let expected = first.len();
            if let Some((index, v)) = embeddings
                .iter()
                .enumerate()
                .find(|(_, v)| v.len() != expected)
            {
                return Err(CatalogError::Dimension {
                    index,
                    expected,
                    got: v.len(),
                });
            }
        }
        Ok(Self { models, embeddings })
    }

    /// Embeds every model's `"{name}. {description}"` text.
    pub async fn build(
        models: Vec<FindingModel>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, CatalogError> {
        let texts: Vec<String> = models.iter().map(FindingModel::embedding_text).collect();
        let vectors = embeddings::embed_batched(provider, &texts, batch_size).await?;
        let catalog = Self::from_parts(models, vectors)?;
        info!(
            models = catalog.len(),
            dimension = catalog.dimension().unwrap_or(0),
            "finding model embeddings ready"
        );
        Ok(catalog)
    }

    pub async fn load(
        path: impl AsRef<Path>,
        provider: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self, CatalogError> {
        let models = load_models(path.as_ref())?;
        info!(models = models.len(), path = %path.as_ref().display(), "loaded finding models");
        Self::build(models, provider, batch_size).await
    }

    pub fn models(&self) -> &[FindingModel] {
        &self.models
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn dimension(&self) -> Option<usize> {
        self.embeddings.first().map(Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::mock::MockEmbedder;
    use providers::noop::NoopProvider;
    use std::fs;

    fn model(id: Option<&str>, name: &str) -> FindingModel {
        FindingModel {
            id: id.map(str::to_string),
            name: name.into(),
            description: format!("{name} description"),
        }
    }

    #[test]
    fn loads_models_with_and_without_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(
            &path,
            r#"[
                {"oifm_id": "OIFM_1", "name": "pulmonary nodule", "description": "A small lung opacity."},
                {"name": "pleural effusion", "description": "Fluid in the pleural space."}
            ]"#,
        )
        .unwrap();

        let models = load_models(&path).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id.as_deref(), Some("OIFM_1"));
        assert_eq!(models[1].id, None);
        assert_eq!(
            models[0].embedding_text(),
            "pulmonary nodule. A small lung opacity."
        );
    }

    #[test]
    fn missing_or_invalid_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_models(dir.path().join("absent.json")),
            Err(CatalogError::Storage(StorageError::Io { .. }))
        ));

        let bad = dir.path().join("bad.json");
        fs::write(&bad, "{not json").unwrap();
        assert!(matches!(
            load_models(&bad),
            Err(CatalogError::Storage(StorageError::Document { .. }))
        ));

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "[]").unwrap();
        assert!(matches!(load_models(&empty), Err(CatalogError::Empty(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models.json");
        fs::write(
            &path,
            r#"[
                {"oifm_id": "OIFM_1", "name": "a", "description": "x"},
                {"oifm_id": "OIFM_1", "name": "b", "description": "y"}
            ]"#,
        )
        .unwrap();
        assert!(matches!(
            load_models(&path),
            Err(CatalogError::DuplicateId(id)) if id == "OIFM_1"
        ));
    }

    #[tokio::test]
    async fn build_embeds_name_and_description() {
        let models = vec![model(Some("OIFM_1"), "mass"), model(None, "cyst")];
        let embedder = MockEmbedder::new(16);
        let catalog = Catalog::build(models, &embedder, 8).await.unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.dimension(), Some(16));
        assert_eq!(
            embedder.calls(),
            vec![vec![
                "mass. mass description".to_string(),
                "cyst. cyst description".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn empty_vectors_are_rejected() {
        let err = Catalog::build(vec![model(None, "mass")], &NoopProvider, 8)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::EmptyVector));
    }

    #[test]
    fn mixed_dimensions_are_rejected() {
        let err = Catalog::from_parts(
            vec![model(None, "a"), model(None, "b")],
            vec![vec![1.0, 0.0], vec![1.0]],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Dimension {
                index: 1,
                expected: 2,
                got: 1
            }
        ));
    }
}
