use radmap_core::pipeline::{ExtractionSummary, MappingSummary, PipelineSummary};

pub fn extraction_line(s: &ExtractionSummary) -> String {
    format!(
        "extract: processed {}, written {}, failed {}, findings {}",
        s.processed, s.written, s.failed, s.findings
    )
}

pub fn mapping_line(s: &MappingSummary) -> String {
    let rate = s
        .match_rate()
        .map(|r| format!("{:.1}%", r * 100.0))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "map: processed {}, written {}, failed {}, matched {}, flagged {}, match rate {}",
        s.processed, s.written, s.failed, s.matched, s.flagged, rate
    )
}

/// Human-readable lines for whichever phases ran.
pub fn render(summary: &PipelineSummary) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(s) = &summary.extraction {
        lines.push(extraction_line(s));
    }
    if let Some(s) = &summary.mapping {
        lines.push(mapping_line(s));
    }
    lines
}

pub fn to_json(summary: &PipelineSummary) -> serde_json::Value {
    let mut value = serde_json::json!({ "status": "ok" });
    if let (Some(obj), Ok(serde_json::Value::Object(phases))) =
        (value.as_object_mut(), serde_json::to_value(summary))
    {
        obj.extend(phases);
    }
    if let Some(rate) = summary.mapping.as_ref().and_then(MappingSummary::match_rate) {
        value["match_rate"] = serde_json::json!(rate);
    }
    value
}
