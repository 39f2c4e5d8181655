//! Domain Classifier
//!
//! Suffix-aware hostname matching against the blocklist and the embed-host
//! allowlist. Block always wins: a host that matches the blocklist is
//! `Blocked` even if some parent is an embed host.

use std::collections::HashSet;

use crate::domain::{is_high_entropy_label, is_ip_literal, registrable_label, tld_of};
use crate::rules::{DomainSet, RuleTables};
use crate::types::Classification;
use crate::url::normalize_host;

/// Classifies hostnames against the rule tables.
#[derive(Debug, Clone)]
pub struct DomainClassifier {
    blocklist: DomainSet,
    embed_hosts: DomainSet,
    suspicious_tlds: HashSet<String>,
}

impl DomainClassifier {
    pub fn new(tables: &RuleTables) -> Self {
        Self {
            blocklist: tables.blocklist.clone(),
            embed_hosts: tables.embed_hosts.clone(),
            suspicious_tlds: tables.suspicious_tlds.clone(),
        }
    }

    /// Classify a raw hostname.
    pub fn classify(&self, hostname: &str) -> Classification {
        self.classify_normalized(&normalize_host(hostname))
    }

    /// Classify a host already passed through `normalize_host`.
    pub fn classify_normalized(&self, host: &str) -> Classification {
        if host.is_empty() {
            return Classification::Unknown;
        }
        if self.blocklist.match_suffix(host).is_some() {
            return Classification::Blocked;
        }
        if self.embed_hosts.match_suffix(host).is_some() {
            return Classification::Allowed;
        }
        Classification::Unknown
    }

    /// Blocklist entry that matched, for telemetry.
    pub fn blocked_by<'h>(&self, host: &'h str) -> Option<&'h str> {
        self.blocklist.match_suffix(host)
    }

    #[inline]
    pub fn is_blocked(&self, host: &str) -> bool {
        self.classify(host) == Classification::Blocked
    }

    /// True for embed hosts that are not also blocked.
    #[inline]
    pub fn is_embed_host(&self, host: &str) -> bool {
        self.classify(host) == Classification::Allowed
    }

    /// High-entropy label under an abused TLD, with no allowlist membership.
    pub fn is_suspicious(&self, host: &str) -> bool {
        let host = normalize_host(host);
        if host.is_empty() || is_ip_literal(&host) {
            return false;
        }
        if self.embed_hosts.match_suffix(&host).is_some() {
            return false;
        }
        if !self.suspicious_tlds.contains(tld_of(&host)) {
            return false;
        }
        registrable_label(&host).is_some_and(is_high_entropy_label)
    }

    pub fn blocklist(&self) -> &DomainSet {
        &self.blocklist
    }

    pub fn embed_hosts(&self) -> &DomainSet {
        &self.embed_hosts
    }
}
