use serde::{Deserialize, Serialize};

/// Sentinel written to `mapped_to` when no catalog model clears the threshold.
pub const FLAGGED_FOR_REVIEW: &str = "flagged_for_review";

/// One input line: a raw report awaiting extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub report_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub name: String,
    pub present: bool,
}

impl Finding {
    /// Builds a finding with its name trimmed and lowercased.
    pub fn normalized(name: &str, present: bool) -> Self {
        Self {
            name: normalize_name(name),
            present,
        }
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub report_id: String,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    Flagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedFinding {
    pub original_finding: String,
    #[serde(default)]
    pub present: bool,
    /// Matched model name, or [`FLAGGED_FOR_REVIEW`].
    pub mapped_to: String,
    /// `None` when flagged or when the matched model has no catalog id.
    pub model_id: Option<String>,
    pub confidence_score: f32,
    pub status: MatchStatus,
}

impl MappedFinding {
    pub fn is_matched(&self) -> bool {
        self.status == MatchStatus::Matched
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingResult {
    pub report_id: String,
    #[serde(default)]
    pub mapped_findings: Vec<MappedFinding>,
}

/// Rounds a score to three decimals for persisted output.
pub fn round_score(score: f32) -> f32 {
    (score * 1000.0).round() / 1000.0
}
