use std::collections::HashSet;

use crate::parser::CompiledRule;

pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    /// Allow entries dropped because the same domain is blocked
    pub conflicts: usize,
}

/// Drop duplicate rules and resolve block/allow overlaps in favor of the block.
pub fn optimize_rules(rules: &mut Vec<CompiledRule>) -> OptimizeStats {
    let before = rules.len();

    let blocked: HashSet<String> = rules
        .iter()
        .filter_map(|rule| match rule {
            CompiledRule::Block(domain) => Some(domain.clone()),
            _ => None,
        })
        .collect();

    let mut conflicts = 0usize;
    rules.retain(|rule| match rule {
        CompiledRule::Allow(domain) if blocked.contains(domain) => {
            log::warn!("'{domain}' is both blocked and allowed; dropping the allow entry");
            conflicts += 1;
            false
        }
        _ => true,
    });

    let mut seen: HashSet<RuleKey> = HashSet::new();
    let mut deduped = 0usize;
    rules.retain(|rule| {
        if seen.insert(RuleKey::from(rule)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    OptimizeStats {
        before,
        after: rules.len(),
        deduped,
        conflicts,
    }
}

/// Identity of a rule for deduplication. Patterns are identified by id so a
/// snapshot never carries two rules under one name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RuleKey {
    Block(String),
    Allow(String),
    Pattern(String),
    CodeKeyword(String),
    MessageKeyword(String),
    SuspiciousTld(String),
}

impl From<&CompiledRule> for RuleKey {
    fn from(rule: &CompiledRule) -> Self {
        match rule {
            CompiledRule::Block(domain) => Self::Block(domain.clone()),
            CompiledRule::Allow(domain) => Self::Allow(domain.clone()),
            CompiledRule::Pattern(pattern) => Self::Pattern(pattern.id.clone()),
            CompiledRule::CodeKeyword(keyword) => Self::CodeKeyword(keyword.to_ascii_lowercase()),
            CompiledRule::MessageKeyword(keyword) => Self::MessageKeyword(keyword.to_ascii_lowercase()),
            CompiledRule::SuspiciousTld(tld) => Self::SuspiciousTld(tld.clone()),
        }
    }
}
