use es_core::hash::crc32;
use es_core::patterns::PatternMatcher;
use es_core::rules::{RuleError, RuleTables};
use es_core::snapshot::{RuleSnapshot, SnapshotError};

use crate::optimizer::optimize_rules;
use crate::parser::{parse_rule_list_from, CompiledRule};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Rules(#[from] RuleError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

#[derive(Debug, Clone, Default)]
pub struct CompileStats {
    pub lists: usize,
    pub lines: usize,
    pub comments: usize,
    pub invalid: usize,
    pub rules_before: usize,
    pub rules_after: usize,
    pub deduped: usize,
    pub conflicts: usize,
    pub list_version: String,
}

/// Fold optimized rules into `base`.
///
/// Blocking always wins: an allow entry covered by the blocklist is skipped,
/// and a blocked domain is taken off the embed hosts.
pub fn build_tables(rules: &[CompiledRule], list_version: &str, base: RuleTables) -> Result<RuleTables, RuleError> {
    let mut tables = base;
    tables.list_version = list_version.to_string();

    for rule in rules {
        if let CompiledRule::Block(domain) = rule {
            if tables.embed_hosts.remove(domain) {
                log::warn!("'{domain}' was an embed host; blocking it instead");
            }
            tables.blocklist.insert(domain)?;
        }
    }

    for rule in rules {
        match rule {
            CompiledRule::Block(_) => {}
            CompiledRule::Allow(domain) => match tables.add_embed_host(domain) {
                Ok(_) => {}
                Err(RuleError::Conflict(blocked)) => log::warn!("skipping embed host '{blocked}': blocked"),
                Err(e) => return Err(e),
            },
            CompiledRule::Pattern(pattern) => {
                if tables.patterns.iter().any(|p| p.id == pattern.id) {
                    log::warn!("skipping pattern '{}': id already defined", pattern.id);
                } else {
                    tables.patterns.push(pattern.clone());
                }
            }
            CompiledRule::CodeKeyword(keyword) => push_unique(&mut tables.code_keywords, keyword),
            CompiledRule::MessageKeyword(keyword) => push_unique(&mut tables.message_keywords, keyword),
            CompiledRule::SuspiciousTld(tld) => {
                tables.suspicious_tlds.insert(tld.clone());
            }
        }
    }

    tables.validate()?;
    PatternMatcher::new(&tables.patterns)?;
    Ok(tables)
}

fn push_unique(list: &mut Vec<String>, keyword: &str) {
    if !list.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
        list.push(keyword.to_string());
    }
}

pub fn build_snapshot(rules: &[CompiledRule], list_version: &str) -> Result<RuleSnapshot, CompileError> {
    let tables = build_tables(rules, list_version, RuleTables::default())?;
    Ok(RuleSnapshot::from_tables(&tables)?)
}

/// Parse, optimize and build one snapshot from several lists.
///
/// The list version is taken from the first `! Version:` header, falling
/// back to a content hash so identical input always yields the same stamp.
pub fn compile_lists(texts: &[&str], base: RuleTables) -> Result<(RuleSnapshot, CompileStats), CompileError> {
    let mut stats = CompileStats {
        lists: texts.len(),
        ..CompileStats::default()
    };
    let mut rules = Vec::new();
    let mut version = None;

    for text in texts {
        let parsed = parse_rule_list_from(text, rules.len());
        stats.lines += parsed.stats.lines;
        stats.comments += parsed.stats.comments;
        stats.invalid += parsed.stats.invalid;
        if version.is_none() {
            version = parsed.version;
        }
        rules.extend(parsed.rules);
    }

    let optimized = optimize_rules(&mut rules);
    stats.rules_before = optimized.before;
    stats.rules_after = optimized.after;
    stats.deduped = optimized.deduped;
    stats.conflicts = optimized.conflicts;
    stats.list_version = version.unwrap_or_else(|| format!("custom-{:08x}", crc32(texts.concat().as_bytes())));

    let tables = build_tables(&rules, &stats.list_version, base)?;
    let snapshot = RuleSnapshot::from_tables(&tables)?;
    log::info!(
        "compiled {} list(s): {} -> {} rules, {} invalid line(s), list version {}",
        stats.lists,
        stats.rules_before,
        stats.rules_after,
        stats.invalid,
        stats.list_version
    );
    Ok((snapshot, stats))
}

#[cfg(test)]
mod tests {
    use es_core::config::EngineConfig;
    use es_core::mediator::Mediator;
    use es_core::rules::PatternKind;
    use es_core::telemetry::Telemetry;
    use es_core::types::{BlockCategory, Decision, RequestContext, SubstituteKind};

    use super::*;

    const LIST: &str = "\
! Version: test-7
||ads.example.com^
0.0.0.0 pop.example.net
@@||player.example.org^
/[?&]goto=https?:/$category=redirect-param,id=goto
tld:xyz
keyword:popunder
";

    fn mediator(snapshot: &RuleSnapshot) -> Mediator {
        let json = snapshot.to_json().expect("snapshot should encode");
        let tables = RuleSnapshot::load(&json)
            .expect("snapshot should load")
            .into_tables()
            .expect("tables should validate");
        Mediator::new(&tables, &EngineConfig::for_origin("https://app.example"), Telemetry::null())
            .expect("mediator should build")
    }

    #[test]
    fn compiled_list_drives_mediator() {
        let (snapshot, stats) = compile_lists(&[LIST], RuleTables::default()).unwrap();
        assert_eq!(stats.list_version, "test-7");
        assert_eq!(snapshot.list_version, "test-7");
        assert_eq!(stats.invalid, 0);

        let mediator = mediator(&snapshot);

        let script = RequestContext::from_fetch("https://cdn.ads.example.com/a.js", "no-cors", "script");
        assert_eq!(
            mediator.decide(&script).decision,
            Decision::BlockSubstitute(SubstituteKind::Script)
        );

        let frame = RequestContext::from_fetch("https://player.example.org/e/1", "navigate", "iframe");
        assert_eq!(mediator.decide(&frame).decision, Decision::Allow);

        let redirect = RequestContext::from_fetch("https://cdn.example/r?goto=https://x.com", "cors", "");
        let verdict = mediator.decide(&redirect);
        assert_eq!(verdict.decision, Decision::BlockSilent);
        assert_eq!(verdict.rule_id.as_deref(), Some("goto"));

        let generated = RequestContext::from_fetch("https://k3j9x8q2w7.xyz/", "navigate", "iframe");
        assert_eq!(mediator.decide(&generated).category, Some(BlockCategory::SuspiciousTld));
    }

    #[test]
    fn version_falls_back_to_content_hash() {
        let (a, stats) = compile_lists(&["||a.example^"], RuleTables::default()).unwrap();
        let (b, _) = compile_lists(&["||a.example^"], RuleTables::default()).unwrap();
        assert!(stats.list_version.starts_with("custom-"));
        assert_eq!(a, b);
    }

    #[test]
    fn list_blocks_override_base_embed_hosts() {
        let base = RuleTables::builtin();
        assert!(base.embed_hosts.contains("vidsrc.to"));

        let (snapshot, _) = compile_lists(&["||vidsrc.to^\n@@||doubleclick.net^"], base).unwrap();
        let tables = snapshot.into_tables().unwrap();
        assert!(tables.blocklist.contains("vidsrc.to"));
        assert!(!tables.embed_hosts.contains("vidsrc.to"));
        assert!(!tables.embed_hosts.contains("doubleclick.net"));
    }

    #[test]
    fn unnamed_patterns_from_separate_lists_are_kept() {
        let (snapshot, stats) = compile_lists(&["/foo-tracker/", "/bar-tracker/"], RuleTables::default()).unwrap();
        assert_eq!(stats.deduped, 0);
        let ids: Vec<_> = snapshot.body.patterns.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["custom-0", "custom-1"]);

        let mediator = mediator(&snapshot);
        for (url, id) in [("https://x.example/foo-tracker/a", "custom-0"), ("https://x.example/bar-tracker/b", "custom-1")] {
            let verdict = mediator.decide(&RequestContext::from_fetch(url, "no-cors", "script"));
            assert_eq!(verdict.rule_id.as_deref(), Some(id), "{url}");
        }
    }

    #[test]
    fn build_snapshot_keeps_pattern_order() {
        let rules = vec![
            CompiledRule::Pattern(es_core::rules::PatternRule::new("b", PatternKind::Beacon, "pixel")),
            CompiledRule::Pattern(es_core::rules::PatternRule::new("a", PatternKind::Custom, "track")),
        ];
        let snapshot = build_snapshot(&rules, "v").unwrap();
        let ids: Vec<_> = snapshot.body.patterns.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }
}
