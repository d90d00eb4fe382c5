use providers::mock::{MockEmbedder, MockLlm};
use providers::ProviderRegistry;
use radmap_core::config::AppConfig;
use radmap_core::models::{ExtractionResult, MappingResult, MatchStatus, FLAGGED_FOR_REVIEW};
use radmap_core::pipeline::{self, PipelineMode};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const CATALOG: &str = r#"[
    {"oifm_id": "OIFM_NODULE", "name": "pulmonary nodule", "description": "Small rounded lung opacity."},
    {"name": "pleural effusion", "description": "Fluid in the pleural space."}
]"#;

fn config_in(dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.extraction.provider = "mock".to_string();
    cfg.embeddings.provider = "mock".to_string();
    cfg.embeddings.batch_size = 1;
    cfg.paths.reports = dir.join("reports.jsonl").to_string_lossy().into_owned();
    cfg.paths.extracted = dir.join("out/extracted.jsonl").to_string_lossy().into_owned();
    cfg.paths.mapped = dir.join("out/mapped.jsonl").to_string_lossy().into_owned();
    cfg.paths.finding_models = dir.join("finding_models.json").to_string_lossy().into_owned();
    cfg
}

fn embedder() -> MockEmbedder {
    MockEmbedder::new(3)
        .with_vector("pulmonary nodule. Small rounded lung opacity.", vec![1.0, 0.0, 0.0])
        .with_vector("pleural effusion. Fluid in the pleural space.", vec![0.0, 1.0, 0.0])
        .with_vector("pulmonary nodule", vec![1.0, 0.0, 0.0])
        .with_vector("pleural effusion", vec![0.0, 1.0, 0.0])
        .with_vector("odd shadow", vec![0.65, 0.0, (1.0f32 - 0.65 * 0.65).sqrt()])
}

fn registry(llm: &MockLlm, embedder: &MockEmbedder) -> ProviderRegistry {
    ProviderRegistry::new()
        .with_llm("mock", Arc::new(llm.clone()))
        .with_embedding("mock", Arc::new(embedder.clone()))
}

#[tokio::test]
async fn test_full_pipeline() {
    let temp = tempfile::tempdir().unwrap();
    let cfg = config_in(temp.path());

    fs::write(
        &cfg.paths.reports,
        [
            r#"{"report_id": "r1", "text": "8 mm Pulmonary Nodule. No pleural effusion. Odd shadow."}"#,
            "",
            r#"{"report_id": "r2", "text": "Model will never answer properly."}"#,
            "this line is not json",
            r#"{"report_id": "r3", "text": "Small left pleural effusion."}"#,
            r#"{"report_id": "r4", "text": "Normal study."}"#,
        ]
        .join("\n"),
    )
    .unwrap();
    fs::write(&cfg.paths.finding_models, CATALOG).unwrap();

    let llm = MockLlm::new()
        .with_reply(
            r#"[{"name": "Pulmonary Nodule", "present": true},
                {"name": "Pleural Effusion", "present": false},
                {"name": "odd shadow", "present": true}]"#,
        )
        .with_reply("I could not find any findings.")
        .with_reply("Still not JSON.")
        .with_reply(r#"{"name": "not an array"}"#)
        .with_reply("```json\n[{\"name\": \"pleural effusion\", \"present\": true}]\n```")
        .with_reply("[]");
    let embedder = embedder();

    let summary = pipeline::run_with_mode_summary(&cfg, &registry(&llm, &embedder), PipelineMode::All)
        .await
        .unwrap();

    // Extraction: r2 exhausts its retries, the bad line is skipped, order is kept.
    let extraction = summary.extraction.unwrap();
    assert_eq!(extraction.processed, 5);
    assert_eq!(extraction.written, 3);
    assert_eq!(extraction.failed, 2);
    assert_eq!(extraction.findings, 4);
    assert_eq!(llm.call_count(), 6);

    let extracted: Vec<ExtractionResult> = storage::read_all(&cfg.paths.extracted).unwrap();
    let ids: Vec<&str> = extracted.iter().map(|r| r.report_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r3", "r4"]);
    assert_eq!(extracted[0].findings[0].name, "pulmonary nodule");
    assert!(!extracted[0].findings[1].present);

    // Mapping
    let mapping = summary.mapping.unwrap();
    assert_eq!(mapping.written, 3);
    assert_eq!(mapping.failed, 0);
    assert_eq!(mapping.matched, 3);
    assert_eq!(mapping.flagged, 1);
    assert_eq!(mapping.match_rate(), Some(0.75));

    let mapped: Vec<MappingResult> = storage::read_all(&cfg.paths.mapped).unwrap();
    assert_eq!(mapped.len(), 3);

    let r1 = &mapped[0].mapped_findings;
    assert_eq!(r1.len(), 3);
    assert_eq!(r1[0].mapped_to, "pulmonary nodule");
    assert_eq!(r1[0].model_id.as_deref(), Some("OIFM_NODULE"));
    assert_eq!(r1[0].confidence_score, 1.0);
    assert_eq!(r1[1].mapped_to, "pleural effusion");
    assert_eq!(r1[1].model_id, None);
    assert!(!r1[1].present);
    assert_eq!(r1[2].mapped_to, FLAGGED_FOR_REVIEW);
    assert_eq!(r1[2].status, MatchStatus::Flagged);
    assert_eq!(r1[2].model_id, None);
    assert_eq!(r1[2].confidence_score, 0.65);

    // A report with no findings still gets a record.
    assert_eq!(mapped[2].report_id, "r4");
    assert!(mapped[2].mapped_findings.is_empty());
}

#[tokio::test]
async fn mapping_provider_failure_skips_only_that_report() {
    let temp = tempfile::tempdir().unwrap();
    let cfg = config_in(temp.path());
    fs::create_dir_all(temp.path().join("out")).unwrap();
    fs::write(&cfg.paths.finding_models, CATALOG).unwrap();
    fs::write(
        &cfg.paths.extracted,
        [
            r#"{"report_id": "a", "findings": [{"name": "pulmonary nodule", "present": true}]}"#,
            r#"{"report_id": "b", "findings": [{"name": "pleural effusion", "present": true}, {"name": "unreachable", "present": true}]}"#,
            r#"{"report_id": "c", "findings": [{"name": "", "present": true}]}"#,
        ]
        .join("\n"),
    )
    .unwrap();

    let llm = MockLlm::new();
    let embedder = embedder().with_failure_on("unreachable");

    let summary = pipeline::run_with_mode_summary(&cfg, &registry(&llm, &embedder), PipelineMode::Map)
        .await
        .unwrap();
    assert!(summary.extraction.is_none());
    let mapping = summary.mapping.unwrap();
    assert_eq!(mapping.processed, 3);
    assert_eq!(mapping.written, 2);
    assert_eq!(mapping.failed, 1);
    assert_eq!(mapping.mappings, 1);

    let mapped: Vec<MappingResult> = storage::read_all(&cfg.paths.mapped).unwrap();
    let ids: Vec<&str> = mapped.iter().map(|r| r.report_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert!(mapped[1].mapped_findings.is_empty());
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn missing_catalog_halts_mapping_before_any_output() {
    let temp = tempfile::tempdir().unwrap();
    let cfg = config_in(temp.path());
    fs::create_dir_all(temp.path().join("out")).unwrap();
    fs::write(
        &cfg.paths.extracted,
        r#"{"report_id": "a", "findings": [{"name": "mass", "present": true}]}"#,
    )
    .unwrap();

    let embedder = embedder();
    let result =
        pipeline::run_with_mode_summary(&cfg, &registry(&MockLlm::new(), &embedder), PipelineMode::Map)
            .await;

    assert!(result.is_err());
    assert!(!Path::new(&cfg.paths.mapped).exists());
    assert!(embedder.calls().is_empty());
}

#[tokio::test]
async fn extraction_transport_error_skips_report_without_retry() {
    let temp = tempfile::tempdir().unwrap();
    let cfg = config_in(temp.path());
    fs::write(
        &cfg.paths.reports,
        [
            r#"{"report_id": "x", "text": "Provider is down for this one."}"#,
            r#"{"report_id": "y", "text": "Then it recovers."}"#,
        ]
        .join("\n"),
    )
    .unwrap();

    let llm = MockLlm::new()
        .with_failure("503 service unavailable")
        .with_reply(r#"[{"name": "Atelectasis", "present": true}]"#);

    let summary =
        pipeline::run_with_mode_summary(&cfg, &registry(&llm, &embedder()), PipelineMode::Extract)
            .await
            .unwrap();
    let extraction = summary.extraction.unwrap();
    assert_eq!(extraction.written, 1);
    assert_eq!(extraction.failed, 1);
    assert_eq!(llm.call_count(), 2);

    let extracted: Vec<ExtractionResult> = storage::read_all(&cfg.paths.extracted).unwrap();
    assert_eq!(extracted.len(), 1);
    assert_eq!(extracted[0].report_id, "y");
    assert_eq!(extracted[0].findings[0].name, "atelectasis");
}
