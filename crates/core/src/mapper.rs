//! Threshold-gated mapping of extracted findings onto catalog models.

use crate::catalog::{Catalog, FindingModel};
use crate::embeddings::{self, EmbeddingError};
use crate::models::{
    normalize_name, round_score, ExtractionResult, Finding, MappedFinding, MappingResult,
    MatchStatus, FLAGGED_FOR_REVIEW,
};
use crate::similarity::cosine_similarity;
use providers::EmbeddingProvider;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("finding embedding has {got} dimensions, catalog has {expected}")]
    Dimension { expected: usize, got: usize },
}

/// Outcome of scoring one finding name against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchDecision {
    pub model_id: Option<String>,
    pub model_name: Option<String>,
    /// Best similarity found, reported even when below threshold.
    pub score: f32,
    pub status: MatchStatus,
}

/// Index and score of the most similar embedding.
///
/// Scans in order with a strict `>` so the earliest of equal scores wins.
pub fn best_match(candidate: &[f32], embeddings: &[Vec<f32>]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, emb) in embeddings.iter().enumerate() {
        let score = cosine_similarity(candidate, emb);
        match best {
            Some((_, top)) if score <= top => {}
            _ => best = Some((i, score)),
        }
    }
    best
}

pub fn decide(best: Option<(usize, f32)>, models: &[FindingModel], threshold: f32) -> MatchDecision {
    match best.and_then(|(i, score)| models.get(i).map(|m| (m, score))) {
        Some((model, score)) if score >= threshold => MatchDecision {
            model_id: model.id.clone(),
            model_name: Some(model.name.clone()),
            score,
            status: MatchStatus::Matched,
        },
        other => MatchDecision {
            model_id: None,
            model_name: None,
            score: other.map(|(_, s)| s).unwrap_or(0.0),
            status: MatchStatus::Flagged,
        },
    }
}

pub struct Mapper {
    embedder: Arc<dyn EmbeddingProvider>,
    threshold: f32,
}

impl Mapper {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, threshold: f32) -> Self {
        Self {
            embedder,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embeds one finding name and picks its closest catalog model.
    pub async fn map(&self, finding_name: &str, catalog: &Catalog) -> Result<MatchDecision, MappingError> {
        let candidate = embeddings::embed_one(self.embedder.as_ref(), finding_name).await?;
        if let Some(expected) = catalog.dimension() {
            if candidate.len() != expected {
                return Err(MappingError::Dimension {
                    expected,
                    got: candidate.len(),
                });
            }
        }
        let best = best_match(&candidate, catalog.embeddings());
        let decision = decide(best, catalog.models(), self.threshold);
        debug!(
            finding = finding_name,
            mapped_to = decision.model_name.as_deref().unwrap_or(FLAGGED_FOR_REVIEW),
            score = decision.score,
            "mapped finding"
        );
        Ok(decision)
    }

    /// Maps one finding; blank names yield `None` and are not scored.
    pub async fn map_finding(
        &self,
        finding: &Finding,
        catalog: &Catalog,
    ) -> Result<Option<MappedFinding>, MappingError> {
        let name = normalize_name(&finding.name);
        if name.is_empty() {
            return Ok(None);
        }
        let decision = self.map(&name, catalog).await?;
        // Status comes from the raw score; a flagged 0.6996 may persist as 0.7.
        Ok(Some(MappedFinding {
            original_finding: name,
            present: finding.present,
            mapped_to: decision
                .model_name
                .unwrap_or_else(|| FLAGGED_FOR_REVIEW.to_string()),
            model_id: decision.model_id,
            confidence_score: round_score(decision.score),
            status: decision.status,
        }))
    }

    /// Maps every finding of a report; any provider failure fails the whole report.
    pub async fn map_result(
        &self,
        extracted: &ExtractionResult,
        catalog: &Catalog,
    ) -> Result<MappingResult, MappingError> {
        let mut mapped_findings = Vec::with_capacity(extracted.findings.len());
        for finding in &extracted.findings {
            if let Some(mapped) = self.map_finding(finding, catalog).await? {
                mapped_findings.push(mapped);
            }
        }
        Ok(MappingResult {
            report_id: extracted.report_id.clone(),
            mapped_findings,
        })
    }
}
