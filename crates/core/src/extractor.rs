//! Structured extraction of findings from free-text reports.
//!
//! The completion model is asked for a JSON array of `{name, present}`
//! objects. Output that does not validate is retried a bounded number of
//! times; provider failures are returned immediately.

use crate::config::ExtractionConfig;
use crate::models::{ExtractionResult, Finding, Report};
use providers::{CompletionRequest, LlmProvider, ProviderError};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You are a radiology AI assistant. Your task is to extract clinical findings from radiology reports.

For each report, identify all radiologic findings mentioned and determine if they are present or absent.

Return your response as a JSON array with the following structure:
[
  {
    "name": "finding name",
    "present": true/false
  }
]

Be thorough and capture all findings mentioned in the report, including:
- Pathological findings (masses, infarcts, hemorrhages, etc.)
- Anatomical variations
- Incidental findings
- Negative findings (explicitly stated as absent)

Return ONLY valid JSON, no additional text."#;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("malformed model output after {attempts} attempt(s): {reason}")]
    Malformed { attempts: u32, reason: String },
    #[error("report text is empty")]
    EmptyReport,
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Extraction failure for one report; the batch carries on without it.
#[derive(Debug, Error)]
#[error("report {report_id}: {error}")]
pub struct ReportFailure {
    pub report_id: String,
    #[source]
    pub error: ExtractionError,
}

#[derive(Deserialize)]
struct RawFinding {
    #[serde(default)]
    name: String,
    #[serde(default)]
    present: bool,
}

/// Removes a surrounding markdown code fence, tagged (```json) or bare.
pub fn strip_code_fence(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let tag_len = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        text = &rest[tag_len..];
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Parses model output into normalized findings.
///
/// The payload must be a JSON array of objects. A missing `name` becomes ""
/// and a missing `present` becomes `false`; wrong types are rejected.
/// Findings whose name is blank after normalization are dropped.
pub fn parse_findings(raw: &str) -> Result<Vec<Finding>, String> {
    let payload = strip_code_fence(raw);
    let items: Vec<RawFinding> = serde_json::from_str(payload).map_err(|e| e.to_string())?;
    Ok(items
        .into_iter()
        .map(|item| Finding::normalized(&item.name, item.present))
        .filter(|f| !f.name.is_empty())
        .collect())
}

pub struct Extractor {
    llm: Arc<dyn LlmProvider>,
    max_retries: u32,
    feedback_on_retry: bool,
}

impl Extractor {
    pub fn new(llm: Arc<dyn LlmProvider>, cfg: &ExtractionConfig) -> Self {
        Self {
            llm,
            max_retries: cfg.max_retries,
            feedback_on_retry: cfg.feedback_on_retry,
        }
    }

    fn request(&self, report_text: &str, feedback: Option<&str>) -> CompletionRequest {
        let mut user = format!("Extract findings from this report:\n\n{report_text}");
        if let Some(reason) = feedback {
            user.push_str(&format!(
                "\n\nYour previous response could not be parsed ({reason}). \
                 Respond with ONLY a JSON array of objects with \"name\" (string) \
                 and \"present\" (boolean)."
            ));
        }
        CompletionRequest {
            system: EXTRACTION_SYSTEM_PROMPT.to_string(),
            user,
            temperature: 0.0,
        }
    }

    /// Extracts findings from one report text.
    pub async fn extract(&self, report_text: &str) -> Result<Vec<Finding>, ExtractionError> {
        if report_text.trim().is_empty() {
            return Err(ExtractionError::EmptyReport);
        }

        let attempts = self.max_retries + 1;
        let mut feedback: Option<String> = None;
        let mut last_reason = String::new();

        for attempt in 1..=attempts {
            let req = self.request(report_text, feedback.as_deref());
            let resp = self.llm.complete(&req).await?;
            match parse_findings(&resp.content) {
                Ok(findings) => {
                    debug!(attempt, findings = findings.len(), "extraction output accepted");
                    return Ok(findings);
                }
                Err(reason) => {
                    debug!(attempt, raw = %resp.content, "rejected extraction output");
                    warn!(attempt, max_attempts = attempts, %reason, "malformed extraction output");
                    if self.feedback_on_retry {
                        feedback = Some(reason.clone());
                    }
                    last_reason = reason;
                }
            }
        }

        Err(ExtractionError::Malformed {
            attempts,
            reason: last_reason,
        })
    }

    pub async fn extract_report(&self, report: &Report) -> Result<ExtractionResult, ReportFailure> {
        match self.extract(&report.text).await {
            Ok(findings) => Ok(ExtractionResult {
                report_id: report.report_id.clone(),
                findings,
            }),
            Err(error) => Err(ReportFailure {
                report_id: report.report_id.clone(),
                error,
            }),
        }
    }
}
