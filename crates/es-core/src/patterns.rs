//! Pattern Matcher
//!
//! Regex evaluation of full request URLs for redirect-chain, beacon and
//! popunder signatures that no static domain list can enumerate. Matching is
//! probabilistic by nature: false positives are accepted.
//!
//! Exemption of own-origin and embed-host traffic is applied by the mediator,
//! which knows both; the matcher itself only answers "does any rule fire".

use regex::{Regex, RegexSet};

use crate::rules::{PatternRule, RuleError};

/// Compiled pattern rules.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    set: RegexSet,
    rules: Vec<(PatternRule, Regex)>,
}

impl PatternMatcher {
    pub fn new(rules: &[PatternRule]) -> Result<Self, RuleError> {
        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = Regex::new(&rule.source).map_err(|source| RuleError::InvalidPattern {
                id: rule.id.clone(),
                source,
            })?;
            compiled.push((rule.clone(), regex));
        }

        // Every source compiled individually above.
        let set = RegexSet::new(rules.iter().map(|r| r.source.as_str())).map_err(|source| {
            RuleError::InvalidPattern {
                id: "<set>".to_string(),
                source,
            }
        })?;

        Ok(Self { set, rules: compiled })
    }

    /// Does any rule match the literal URL?
    #[inline]
    pub fn matches(&self, url: &str) -> bool {
        self.set.is_match(url)
    }

    /// First rule (in table order) that matches, for reporting.
    pub fn first_match(&self, url: &str) -> Option<&PatternRule> {
        let hit = self.set.matches(url).into_iter().next()?;
        self.rules.get(hit).map(|(rule, _)| rule)
    }

    /// Every rule that matches, with the matched text.
    pub fn explain<'u>(&self, url: &'u str) -> Vec<(&PatternRule, &'u str)> {
        self.set
            .matches(url)
            .into_iter()
            .filter_map(|idx| {
                let (rule, regex) = self.rules.get(idx)?;
                regex.find(url).map(|m| (rule, m.as_str()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{PatternKind, RuleTables};

    fn matcher() -> PatternMatcher {
        PatternMatcher::new(&RuleTables::builtin().patterns).expect("builtin patterns compile")
    }

    #[test]
    fn redirect_param_shapes() {
        let m = matcher();
        assert!(m.matches("https://example.com/watch?redirect=https%3A%2F%2Fadsterra.com%2Fx"));
        assert!(m.matches("https://example.com/?a=1&goto=http://evil.example/"));
        assert!(m.matches("https://example.com/?url=//evil.example/"));
        assert!(!m.matches("https://example.com/watch?id=603&season=1"));
    }

    #[test]
    fn path_and_base64_redirects() {
        let m = matcher();
        assert!(m.matches("https://trk.example/go/https://ad.example/land"));
        assert!(m.matches("https://trk.example/out/http%3A%2F%2Fad.example"));
        assert!(m.matches("https://trk.example/r?to=aHR0cHM6Ly9hZC5leGFtcGxlLw=="));
        assert!(!m.matches("https://example.com/gopher/page"));
    }

    #[test]
    fn shortlinks_beacons_popunders() {
        let m = matcher();
        assert!(m.matches("https://bit.ly/3abc"));
        assert!(m.matches("http://www.ouo.io/xyz"));
        assert!(!m.matches("https://notbit.ly.example.com/"));
        assert!(m.matches("https://stats.example/pixel.gif?id=1"));
        assert!(m.matches("https://cdn.example/js/popunder.min.js"));
        assert!(m.matches("https://cdn.example/push-subscribe.js"));
    }

    #[test]
    fn first_match_reports_rule() {
        let m = matcher();
        let rule = m.first_match("https://example.com/?redirect=https://x.y/").unwrap();
        assert_eq!(rule.kind, PatternKind::RedirectParam);
        assert!(m.first_match("https://example.com/").is_none());
    }

    #[test]
    fn explain_lists_all_hits() {
        let m = matcher();
        let hits = m.explain("https://bit.ly/go/https://popads.example/");
        let kinds: Vec<_> = hits.iter().map(|(r, _)| r.kind).collect();
        assert!(kinds.contains(&PatternKind::Shortlink));
        assert!(kinds.contains(&PatternKind::PathRedirect));
        assert!(kinds.contains(&PatternKind::Popunder));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let rules = vec![PatternRule::new("broken", PatternKind::Custom, "(unclosed")];
        assert!(matches!(PatternMatcher::new(&rules), Err(RuleError::InvalidPattern { id, .. }) if id == "broken"));
    }
}
