use crate::catalog::Catalog;
use crate::config::AppConfig;
use crate::extractor::Extractor;
use crate::mapper::Mapper;
use crate::models::{ExtractionResult, Report};
use anyhow::Context;
use providers::noop::NoopProvider;
use providers::openai::{OpenAiConfig, OpenAiProvider, DEFAULT_BASE_URL};
use providers::ProviderRegistry;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use storage::{JsonlReader, JsonlWriter, Line};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    Extract,
    Map,
    All,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractionSummary {
    /// Non-blank input lines seen.
    pub processed: usize,
    pub written: usize,
    pub failed: usize,
    pub findings: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MappingSummary {
    pub processed: usize,
    pub written: usize,
    pub failed: usize,
    pub mappings: usize,
    pub matched: usize,
    pub flagged: usize,
}

impl MappingSummary {
    /// Share of mapped findings that matched, or `None` when nothing was mapped.
    pub fn match_rate(&self) -> Option<f64> {
        let total = self.matched + self.flagged;
        (total > 0).then(|| self.matched as f64 / total as f64)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingSummary>,
}

pub async fn run_with_mode_summary(
    config: &AppConfig,
    registry: &ProviderRegistry,
    mode: PipelineMode,
) -> anyhow::Result<PipelineSummary> {
    let mut summary = PipelineSummary::default();

    if matches!(mode, PipelineMode::Extract | PipelineMode::All) {
        info!("Starting extraction phase...");
        let s = run_extraction(config, registry).await?;
        info!(
            processed = s.processed,
            written = s.written,
            failed = s.failed,
            findings = s.findings,
            "Extraction complete."
        );
        summary.extraction = Some(s);
    }

    if matches!(mode, PipelineMode::Map | PipelineMode::All) {
        info!("Starting mapping phase...");
        let s = run_mapping(config, registry).await?;
        info!(
            processed = s.processed,
            written = s.written,
            failed = s.failed,
            matched = s.matched,
            flagged = s.flagged,
            "Mapping complete."
        );
        summary.mapping = Some(s);
    }

    Ok(summary)
}

pub async fn run_extraction(
    config: &AppConfig,
    registry: &ProviderRegistry,
) -> anyhow::Result<ExtractionSummary> {
    let llm = registry
        .llm(Some(&config.extraction.provider))
        .context("extraction provider")?;
    let extractor = Extractor::new(llm, &config.extraction);
    extract_file(
        &extractor,
        Path::new(&config.paths.reports),
        Path::new(&config.paths.extracted),
    )
    .await
}

pub async fn run_mapping(
    config: &AppConfig,
    registry: &ProviderRegistry,
) -> anyhow::Result<MappingSummary> {
    let embedder = registry
        .embedding(Some(&config.embeddings.provider))
        .context("embedding provider")?;
    let catalog = Catalog::load(
        &config.paths.finding_models,
        embedder.as_ref(),
        config.embeddings.batch_size,
    )
    .await
    .context("finding model catalog")?;
    let mapper = Mapper::new(embedder, config.mapping.threshold);
    map_file(
        &mapper,
        &catalog,
        Path::new(&config.paths.extracted),
        Path::new(&config.paths.mapped),
    )
    .await
}

/// Pulls the next record, logging and counting lines that fail to decode.
///
/// I/O errors end the phase; a single undecodable line does not.
fn next_record<T>(
    reader: &mut JsonlReader<T>,
    malformed: &mut usize,
) -> anyhow::Result<Option<Line<T>>>
where
    T: serde::de::DeserializeOwned,
{
    for item in reader.by_ref() {
        match item {
            Ok(line) => return Ok(Some(line)),
            Err(e) if e.is_record_level() => {
                warn!(error = %e, "skipping malformed input line");
                *malformed += 1;
            }
            Err(e) => return Err(e).context("reading input"),
        }
    }
    Ok(None)
}

/// Extracts every report in `input`, writing one result per report to `output`.
pub async fn extract_file(
    extractor: &Extractor,
    input: &Path,
    output: &Path,
) -> anyhow::Result<ExtractionSummary> {
    let mut reader = JsonlReader::<Report>::open(input).context("opening reports")?;
    let mut writer = JsonlWriter::create(output).context("creating extraction output")?;
    info!(input = %input.display(), output = %output.display(), "extracting findings");

    let mut summary = ExtractionSummary::default();
    let mut seen = HashSet::new();
    let mut malformed = 0;

    while let Some(line) = next_record(&mut reader, &mut malformed)? {
        summary.processed += 1;
        let report = line.value;
        if !seen.insert(report.report_id.clone()) {
            warn!(report_id = %report.report_id, line = line.number, "duplicate report id, skipping");
            summary.failed += 1;
            continue;
        }

        match extractor.extract_report(&report).await {
            Ok(result) => {
                info!(report_id = %result.report_id, findings = result.findings.len(), "extracted");
                writer.append(&result)?;
                summary.written += 1;
                summary.findings += result.findings.len();
            }
            Err(failure) => {
                warn!(report_id = %failure.report_id, error = %failure.error, "extraction failed");
                summary.failed += 1;
            }
        }
    }

    writer.finish()?;
    summary.processed += malformed;
    summary.failed += malformed;
    Ok(summary)
}

/// Maps every extraction result in `input` against `catalog`.
pub async fn map_file(
    mapper: &Mapper,
    catalog: &Catalog,
    input: &Path,
    output: &Path,
) -> anyhow::Result<MappingSummary> {
    let mut reader =
        JsonlReader::<ExtractionResult>::open(input).context("opening extracted findings")?;
    let mut writer = JsonlWriter::create(output).context("creating mapping output")?;
    info!(
        input = %input.display(),
        output = %output.display(),
        threshold = mapper.threshold(),
        "mapping findings"
    );

    let mut summary = MappingSummary::default();
    let mut seen = HashSet::new();
    let mut malformed = 0;

    while let Some(line) = next_record(&mut reader, &mut malformed)? {
        summary.processed += 1;
        let extracted = line.value;
        if !seen.insert(extracted.report_id.clone()) {
            warn!(report_id = %extracted.report_id, line = line.number, "duplicate report id, skipping");
            summary.failed += 1;
            continue;
        }

        match mapper.map_result(&extracted, catalog).await {
            Ok(result) => {
                let matched = result.mapped_findings.iter().filter(|m| m.is_matched()).count();
                let flagged = result.mapped_findings.len() - matched;
                info!(report_id = %result.report_id, matched, flagged, "mapped");
                writer.append(&result)?;
                summary.written += 1;
                summary.mappings += result.mapped_findings.len();
                summary.matched += matched;
                summary.flagged += flagged;
            }
            Err(e) => {
                warn!(report_id = %extracted.report_id, error = %e, "mapping failed");
                summary.failed += 1;
            }
        }
    }

    writer.finish()?;
    summary.processed += malformed;
    summary.failed += malformed;
    Ok(summary)
}

pub fn build_registry(config: &AppConfig) -> ProviderRegistry {
    let mut reg = ProviderRegistry::new()
        .with_embedding("noop", Arc::new(NoopProvider))
        .with_llm("noop", Arc::new(NoopProvider));

    if let Some(key) = std::env::var_os("OPENAI_API_KEY") {
        let base = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let provider = OpenAiProvider::new(OpenAiConfig {
            api_key: key.to_string_lossy().into_owned(),
            base_url: base,
            embedding_model: config.embeddings.model.clone(),
            chat_model: config.extraction.model.clone(),
        });
        reg = reg
            .with_embedding("openai", Arc::new(provider.clone()))
            .with_llm("openai", Arc::new(provider));
    } else {
        warn!("OPENAI_API_KEY not set; only the noop provider is available");
    }

    reg.set_preferred_embedding(&config.embeddings.provider)
        .set_preferred_llm(&config.extraction.provider)
}
