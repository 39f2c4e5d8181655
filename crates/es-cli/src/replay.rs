use std::collections::BTreeMap;
use std::time::Instant;

use es_core::mediator::Mediator;
use es_core::types::{Decision, RequestContext, SubstituteKind, Verdict};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRequest {
    pub url: String,
    pub mode: String,
    pub destination: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub requests: usize,
    pub blocked: usize,
    pub decisions: BTreeMap<String, usize>,
    pub categories: BTreeMap<String, usize>,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
    pub max_us: f64,
}

pub fn decision_label(decision: Decision) -> &'static str {
    match decision {
        Decision::Allow => "allow",
        Decision::BlockSilent => "block-silent",
        Decision::BlockSubstitute(SubstituteKind::Script) => "substitute-script",
        Decision::BlockSubstitute(SubstituteKind::Image) => "substitute-image",
        Decision::BlockSubstitute(SubstituteKind::Stylesheet) => "substitute-stylesheet",
        Decision::BlockSubstitute(SubstituteKind::Document) => "substitute-document",
        Decision::BlockSubstitute(SubstituteKind::Text) => "substitute-text",
        Decision::BlockNavigation => "block-navigation",
    }
}

/// Parse an NDJSON trace of `{url, mode, destination, referrer}` lines.
/// Lines without a URL or that fail to parse are skipped.
pub fn parse_trace(text: &str, limit: usize) -> Vec<TraceRequest> {
    let mut out = Vec::new();
    for line in text.lines() {
        if out.len() >= limit {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(val) => val,
            Err(e) => {
                log::debug!("skipping trace line: {e}");
                continue;
            }
        };
        let url = value.get("url").and_then(|v| v.as_str()).unwrap_or("");
        if url.is_empty() {
            continue;
        }
        let field = |name: &str, default: &str| value.get(name).and_then(|v| v.as_str()).unwrap_or(default).to_string();

        out.push(TraceRequest {
            url: url.to_string(),
            mode: field("mode", "no-cors"),
            destination: field("destination", ""),
            referrer: value.get("referrer").and_then(|v| v.as_str()).map(str::to_string),
        });
    }
    out
}

pub fn load_trace(path: &str, limit: usize) -> Result<Vec<TraceRequest>, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("Failed to read trace '{path}': {e}"))?;
    let requests = parse_trace(&text, limit);
    if requests.is_empty() {
        return Err(format!("Trace loaded 0 requests from {path}"));
    }
    Ok(requests)
}

pub fn decide(mediator: &Mediator, request: &TraceRequest) -> Verdict {
    let ctx = RequestContext::from_fetch(&request.url, &request.mode, &request.destination)
        .with_referrer(request.referrer.as_deref());
    mediator.decide(&ctx)
}

pub fn replay(mediator: &Mediator, requests: &[TraceRequest]) -> ReplaySummary {
    let mut summary = ReplaySummary {
        requests: requests.len(),
        ..ReplaySummary::default()
    };
    let mut latencies = Vec::with_capacity(requests.len());

    for request in requests {
        let start = Instant::now();
        let verdict = decide(mediator, request);
        latencies.push(start.elapsed().as_secs_f64() * 1_000_000.0);

        *summary.decisions.entry(decision_label(verdict.decision).to_string()).or_default() += 1;
        if verdict.decision.is_block() {
            summary.blocked += 1;
        }
        if let Some(category) = verdict.category {
            *summary.categories.entry(category.as_str().to_string()).or_default() += 1;
        }
    }

    latencies.sort_by(|a, b| a.total_cmp(b));
    summary.p50_us = percentile(&latencies, 0.50);
    summary.p95_us = percentile(&latencies, 0.95);
    summary.p99_us = percentile(&latencies, 0.99);
    summary.max_us = latencies.last().copied().unwrap_or(0.0);
    summary
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}

pub fn format_summary(summary: &ReplaySummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("Requests:  {}\n", summary.requests));
    out.push_str(&format!("Blocked:   {}\n", summary.blocked));
    out.push_str("Decisions:\n");
    for (label, count) in &summary.decisions {
        out.push_str(&format!("  {label:<22} {count}\n"));
    }
    if !summary.categories.is_empty() {
        out.push_str("Categories:\n");
        for (label, count) in &summary.categories {
            out.push_str(&format!("  {label:<22} {count}\n"));
        }
    }
    out.push_str(&format!(
        "Latency:   p50 {:.2}us, p95 {:.2}us, p99 {:.2}us, max {:.2}us",
        summary.p50_us, summary.p95_us, summary.p99_us, summary.max_us
    ));
    out
}

#[cfg(test)]
mod tests {
    use es_core::config::EngineConfig;
    use es_core::telemetry::Telemetry;

    use super::*;

    const TRACE: &str = r#"
{"url": "https://app.example/", "mode": "navigate", "destination": "document"}
{"url": "https://securepubads.g.doubleclick.net/tag.js", "mode": "no-cors", "destination": "script"}
not json
{"mode": "cors"}
{"url": "https://evil.example/", "mode": "navigate", "destination": "document", "referrer": "https://vidsrc.to/"}
{"url": "https://vidsrc.to/embed/1", "mode": "navigate", "destination": "iframe"}
"#;

    fn mediator() -> Mediator {
        Mediator::with_builtin(&EngineConfig::for_origin("https://app.example"), Telemetry::null()).unwrap()
    }

    #[test]
    fn parse_skips_bad_lines() {
        let requests = parse_trace(TRACE, usize::MAX);
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[2].referrer.as_deref(), Some("https://vidsrc.to/"));
        assert_eq!(parse_trace(TRACE, 2).len(), 2);
    }

    #[test]
    fn replay_counts_decisions() {
        let summary = replay(&mediator(), &parse_trace(TRACE, usize::MAX));
        assert_eq!(summary.requests, 4);
        assert_eq!(summary.blocked, 2);
        assert_eq!(summary.decisions.get("allow"), Some(&2));
        assert_eq!(summary.decisions.get("substitute-script"), Some(&1));
        assert_eq!(summary.decisions.get("block-navigation"), Some(&1));
        assert_eq!(summary.categories.get("navigation"), Some(&1));
        assert!(summary.p50_us <= summary.p99_us);
        assert!(summary.p99_us <= summary.max_us);
    }

    #[test]
    fn percentile_of_empty_is_zero() {
        assert_eq!(percentile(&[], 0.99), 0.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0], 0.5), 2.0);
    }
}
