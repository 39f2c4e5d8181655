//! Rule tables
//!
//! Static data consulted by every other component: the domain blocklist, the
//! embed-host allowlist, the URL pattern rules, the suspicious TLD list and the
//! keyword lists used for dynamic-code and message inspection. Tables are
//! read-only once the engine is built.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::walk_suffixes;
use crate::url::normalize_host;

/// Version stamp of the tables compiled into the binary.
pub const BUILTIN_LIST_VERSION: &str = "builtin-5";

/// Error type for rule table construction.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Domain '{0}' is both blocked and allowed")]
    Conflict(String),
    #[error("Invalid domain: '{0}'")]
    InvalidDomain(String),
    #[error("Invalid pattern '{id}': {source}")]
    InvalidPattern {
        id: String,
        #[source]
        source: regex::Error,
    },
}

// =============================================================================
// Domain Sets
// =============================================================================

/// Suffix-matchable set of domains. A host matches if it or any parent
/// domain is present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet {
    entries: HashSet<String>,
}

impl DomainSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a domain after normalization. Returns false for duplicates.
    pub fn insert(&mut self, domain: &str) -> Result<bool, RuleError> {
        let normalized = normalize_domain(domain).ok_or_else(|| RuleError::InvalidDomain(domain.to_string()))?;
        Ok(self.entries.insert(normalized))
    }

    pub fn remove(&mut self, domain: &str) -> bool {
        self.entries.remove(&normalize_host(domain))
    }

    /// Exact membership of an already-normalized host.
    #[inline]
    pub fn contains(&self, host: &str) -> bool {
        self.entries.contains(host)
    }

    /// Entry matched by `host` or its closest parent, if any.
    pub fn match_suffix<'h>(&self, host: &'h str) -> Option<&'h str> {
        walk_suffixes(host).find(|suffix| self.entries.contains(*suffix))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in sorted order, for snapshots and display.
    pub fn sorted(&self) -> Vec<&str> {
        let sorted: BTreeSet<&str> = self.entries.iter().map(String::as_str).collect();
        sorted.into_iter().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

/// Normalize a rule-table domain. Rejects anything that is not a plain
/// dotted hostname.
pub fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
        || trimmed.contains("..")
    {
        return None;
    }

    Some(normalize_host(trimmed))
}

// =============================================================================
// Pattern Rules
// =============================================================================

/// Shape of URL a pattern rule targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    RedirectParam,
    PathRedirect,
    Base64Redirect,
    Shortlink,
    Beacon,
    Popunder,
    PushSubscribe,
    Custom,
}

impl PatternKind {
    pub fn from_str(s: &str) -> Self {
        match s {
            "redirect-param" => Self::RedirectParam,
            "path-redirect" => Self::PathRedirect,
            "base64-redirect" => Self::Base64Redirect,
            "shortlink" => Self::Shortlink,
            "beacon" => Self::Beacon,
            "popunder" => Self::Popunder,
            "push-subscribe" => Self::PushSubscribe,
            _ => Self::Custom,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedirectParam => "redirect-param",
            Self::PathRedirect => "path-redirect",
            Self::Base64Redirect => "base64-redirect",
            Self::Shortlink => "shortlink",
            Self::Beacon => "beacon",
            Self::Popunder => "popunder",
            Self::PushSubscribe => "push-subscribe",
            Self::Custom => "custom",
        }
    }
}

/// A regular expression evaluated against the full request URL. Each rule is
/// an independent predicate: any match blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    pub kind: PatternKind,
    pub source: String,
}

impl PatternRule {
    pub fn new(id: impl Into<String>, kind: PatternKind, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            source: source.into(),
        }
    }
}

// =============================================================================
// Rule Tables
// =============================================================================

/// All static rule data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTables {
    pub list_version: String,
    pub blocklist: DomainSet,
    pub embed_hosts: DomainSet,
    pub patterns: Vec<PatternRule>,
    pub suspicious_tlds: HashSet<String>,
    /// Tokens that mark an eval/Function/timer payload as hostile
    pub code_keywords: Vec<String>,
    /// Tokens that mark a cross-frame message as a redirect command
    pub message_keywords: Vec<String>,
}

impl RuleTables {
    /// The tables shipped with the engine.
    pub fn builtin() -> Self {
        let mut tables = Self {
            list_version: BUILTIN_LIST_VERSION.to_string(),
            ..Self::default()
        };

        for domain in BUILTIN_BLOCKLIST {
            // Builtin data is known-good.
            let _ = tables.blocklist.insert(domain);
        }
        for host in BUILTIN_EMBED_HOSTS {
            let _ = tables.embed_hosts.insert(host);
        }
        tables.patterns = BUILTIN_PATTERNS
            .iter()
            .map(|(id, kind, source)| PatternRule::new(*id, *kind, *source))
            .collect();
        tables.suspicious_tlds = BUILTIN_SUSPICIOUS_TLDS.iter().map(|s| s.to_string()).collect();
        tables.code_keywords = BUILTIN_CODE_KEYWORDS.iter().map(|s| s.to_string()).collect();
        tables.message_keywords = BUILTIN_MESSAGE_KEYWORDS.iter().map(|s| s.to_string()).collect();
        tables
    }

    /// Add an embed host supplied by the wrapper-page generator.
    ///
    /// A host already on the blocklist (exactly or through a parent) is
    /// rejected so the two sets never overlap.
    pub fn add_embed_host(&mut self, host: &str) -> Result<bool, RuleError> {
        let normalized = normalize_domain(host).ok_or_else(|| RuleError::InvalidDomain(host.to_string()))?;
        if self.blocklist.match_suffix(&normalized).is_some() {
            return Err(RuleError::Conflict(normalized));
        }
        self.embed_hosts.insert(&normalized)
    }

    /// Check the both-sets invariant.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut conflicts: Vec<&str> = self
            .embed_hosts
            .iter()
            .filter(|host| self.blocklist.contains(host))
            .collect();
        conflicts.sort_unstable();
        match conflicts.first() {
            Some(domain) => Err(RuleError::Conflict(domain.to_string())),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Builtin data
// =============================================================================

const BUILTIN_BLOCKLIST: &[&str] = &[
    "doubleclick.net", "googlesyndication.com", "adnxs.com", "adroll.com",
    "rubiconproject.com", "openx.net", "pubmatic.com", "exoclick.com",
    "trafficjunky.net", "popads.net", "popcash.net", "propellerads.com",
    "adsterra.com", "adcash.com", "juicyads.com", "yllix.com", "evadav.com",
    "richpush.co", "coinzilla.io", "a-ads.com", "revcontent.com", "taboola.com",
    "mgid.com", "hilltopads.net", "clickadu.com", "zeropark.com", "adform.net",
    "adkernel.com", "33across.com", "smartadserver.com", "criteo.com",
    "appnexus.com", "lijit.com", "sovrn.com", "bidswitch.net", "media.net",
    "yieldmo.com", "sharethrough.com", "undertone.com", "conversantmedia.com",
    "amazon-adsystem.com", "adskeeper.com", "adtelligent.com", "adingo.jp",
    "advertising.com", "2mdn.net", "googletagmanager.com", "googletagservices.com",
    "quantserve.com", "scorecardresearch.com", "outbrain.com", "zemanta.com",
    "ads.yahoo.com", "ads.twitter.com", "adsystem.amazon.com",
    "adservice.google.com", "pagead2.googlesyndication.com",
    "tpc.googlesyndication.com", "securepubads.g.doubleclick.net",
];

const BUILTIN_EMBED_HOSTS: &[&str] = &[
    "vidsrc.cc", "vidsrc.to", "vidsrc.me", "vidsrc.xyz", "vidsrc.net",
    "player.autoembed.cc", "autoembed.cc",
    "multiembed.mov",
    "embed.su",
    "vidlink.pro",
    "2embed.cc", "2embed.to",
    "streamed.su", "streamed.pk",
];

const BUILTIN_PATTERNS: &[(&str, PatternKind, &str)] = &[
    (
        "redirect-param",
        PatternKind::RedirectParam,
        r"(?i)[?&](?:redirect|redirect_?ur[li]|redir|goto|go|url|target|dest|destination|out|rurl|link|clickurl)=(?:https?(?::|%3a)|%2f%2f|//)",
    ),
    (
        "path-redirect",
        PatternKind::PathRedirect,
        r"(?i)/(?:go|out|redirect|redir|away|click|jump|link)/+https?(?::|%3a)",
    ),
    (
        "base64-redirect",
        PatternKind::Base64Redirect,
        r"(?:[?&=/])aHR0c(?:DovL|HM6Ly)[A-Za-z0-9+/=_-]{4,}",
    ),
    (
        "shortlink",
        PatternKind::Shortlink,
        r"(?i)^https?://(?:[^/?#]+\.)?(?:bit\.ly|tinyurl\.com|shorte\.st|sh\.st|adf\.ly|ouo\.io|ouo\.press|linkvertise\.com|bc\.vc|cutt\.ly|exe\.io|shrinkme\.io)(?:[:/?#]|$)",
    ),
    (
        "beacon-path",
        PatternKind::Beacon,
        r"(?i)/(?:pixel|1x1|spacer|beacon|tracking-pixel|imp(?:ression)?)\.(?:gif|png|php)(?:[?#]|$)",
    ),
    (
        "popunder-token",
        PatternKind::Popunder,
        r"(?i)(?:popunder|clickunder|pop_under|popads|popcash)",
    ),
    (
        "push-subscribe",
        PatternKind::PushSubscribe,
        r"(?i)/(?:push-?subscribe|sw-?push|push-?notification)s?(?:[./?#]|$)",
    ),
];

const BUILTIN_SUSPICIOUS_TLDS: &[&str] = &[
    "xyz", "top", "click", "buzz", "icu", "cyou", "cfd", "sbs", "rest",
    "monster", "quest", "bond", "lol", "pw", "tk", "ml", "ga", "cf", "gq",
    "work", "loan", "win", "bid",
];

const BUILTIN_CODE_KEYWORDS: &[&str] = &[
    "popunder", "clickunder", "window.open(", "popads", "popcash",
    "adsterra", "propellerads", "trafficjunky", "exoclick",
];

const BUILTIN_MESSAGE_KEYWORDS: &[&str] = &[
    "window.open", "location.href", "location.replace", "location.assign",
    "popunder", "clickunder", "_blank", "redirect", "popads", "adsterra",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_tables_are_consistent() {
        let tables = RuleTables::builtin();
        tables.validate().expect("builtin tables must not overlap");
        assert!(tables.blocklist.contains("doubleclick.net"));
        assert!(tables.embed_hosts.contains("vidsrc.cc"));
        assert_eq!(tables.patterns.len(), BUILTIN_PATTERNS.len());
        assert_eq!(tables.list_version, BUILTIN_LIST_VERSION);
    }

    #[test]
    fn domain_set_suffix_match() {
        let mut set = DomainSet::new();
        set.insert("ad.com").unwrap();
        assert_eq!(set.match_suffix("a.b.ad.com"), Some("ad.com"));
        assert_eq!(set.match_suffix("ad.com"), Some("ad.com"));
        assert_eq!(set.match_suffix("bad.com"), None);
        assert_eq!(set.match_suffix("ad.com.evil.net"), None);
    }

    #[test]
    fn domain_set_normalizes() {
        let mut set = DomainSet::new();
        assert!(set.insert("WWW.Example.com.").unwrap());
        assert!(!set.insert("example.com").unwrap());
        assert!(set.contains("example.com"));
        assert!(set.insert("bad host").is_err());
        assert!(set.insert("a..b").is_err());
    }

    #[test]
    fn embed_host_cannot_be_blocked() {
        let mut tables = RuleTables::builtin();
        assert!(matches!(
            tables.add_embed_host("cdn.doubleclick.net"),
            Err(RuleError::Conflict(_))
        ));
        assert!(tables.add_embed_host("player.example.tv").unwrap());
    }

    #[test]
    fn validate_reports_conflict() {
        let mut tables = RuleTables::default();
        tables.blocklist.insert("both.com").unwrap();
        tables.embed_hosts.insert("both.com").unwrap();
        assert!(matches!(tables.validate(), Err(RuleError::Conflict(d)) if d == "both.com"));
    }
}
