//! ESRT Snapshot Loader

use std::collections::BTreeSet;

use crate::hash::crc32;
use crate::patterns::PatternMatcher;
use crate::rules::{RuleError, RuleTables};
use super::format::*;

/// Error type for snapshot loading.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid magic: '{0}'")]
    InvalidMagic(String),
    #[error("Unsupported version: {0}")]
    UnsupportedVersion(u16),
    #[error("CRC32 mismatch: stored={stored}, computed={computed}")]
    Crc32Mismatch { stored: u32, computed: u32 },
    #[error("Malformed snapshot: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid rules: {0}")]
    Rules(#[from] RuleError),
}

/// Entry counts, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotStats {
    pub blocked_domains: usize,
    pub embed_hosts: usize,
    pub patterns: usize,
    pub suspicious_tlds: usize,
    pub code_keywords: usize,
    pub message_keywords: usize,
}

impl SnapshotBody {
    /// CRC32 of the canonical JSON encoding.
    pub fn checksum(&self) -> Result<u32, SnapshotError> {
        let canonical = serde_json::to_vec(self)?;
        Ok(crc32(&canonical))
    }

    /// Body with every list sorted and deduplicated.
    pub fn from_tables(tables: &RuleTables) -> Self {
        fn sorted<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
            items.collect::<BTreeSet<_>>().into_iter().map(str::to_string).collect()
        }

        // Pattern order is reporting order: keep it, drop repeated ids.
        let mut seen = BTreeSet::new();
        let patterns = tables
            .patterns
            .iter()
            .filter(|rule| seen.insert(rule.id.as_str()))
            .cloned()
            .collect();

        Self {
            blocklist: sorted(tables.blocklist.iter()),
            embed_hosts: sorted(tables.embed_hosts.iter()),
            patterns,
            suspicious_tlds: sorted(tables.suspicious_tlds.iter().map(String::as_str)),
            code_keywords: sorted(tables.code_keywords.iter().map(String::as_str)),
            message_keywords: sorted(tables.message_keywords.iter().map(String::as_str)),
        }
    }
}

impl RuleSnapshot {
    /// Build a snapshot of the given tables.
    pub fn from_tables(tables: &RuleTables) -> Result<Self, SnapshotError> {
        let body = SnapshotBody::from_tables(tables);
        Ok(Self {
            magic: ESRT_MAGIC.to_string(),
            version: ESRT_VERSION,
            list_version: tables.list_version.clone(),
            checksum: body.checksum()?,
            body,
        })
    }

    /// Parse and verify a snapshot document.
    pub fn load(text: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = serde_json::from_str(text)?;

        // Validate magic
        if snapshot.magic != ESRT_MAGIC {
            return Err(SnapshotError::InvalidMagic(snapshot.magic));
        }
        if snapshot.version != ESRT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        let computed = snapshot.body.checksum()?;
        if computed != snapshot.checksum {
            return Err(SnapshotError::Crc32Mismatch {
                stored: snapshot.checksum,
                computed,
            });
        }

        log::info!(
            "loaded snapshot {} ({} blocked, {} embed hosts, {} patterns)",
            snapshot.list_version,
            snapshot.body.blocklist.len(),
            snapshot.body.embed_hosts.len(),
            snapshot.body.patterns.len()
        );
        Ok(snapshot)
    }

    /// Pretty JSON for writing to disk.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rebuild rule tables, checking domains, invariants and regexes.
    pub fn into_tables(self) -> Result<RuleTables, SnapshotError> {
        let mut tables = RuleTables {
            list_version: self.list_version,
            ..RuleTables::default()
        };
        for domain in &self.body.blocklist {
            tables.blocklist.insert(domain)?;
        }
        for host in &self.body.embed_hosts {
            tables.embed_hosts.insert(host)?;
        }
        tables.validate()?;

        PatternMatcher::new(&self.body.patterns)?;
        tables.patterns = self.body.patterns;
        tables.suspicious_tlds = self.body.suspicious_tlds.into_iter().collect();
        tables.code_keywords = self.body.code_keywords;
        tables.message_keywords = self.body.message_keywords;
        Ok(tables)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            blocked_domains: self.body.blocklist.len(),
            embed_hosts: self.body.embed_hosts.len(),
            patterns: self.body.patterns.len(),
            suspicious_tlds: self.body.suspicious_tlds.len(),
            code_keywords: self.body.code_keywords.len(),
            message_keywords: self.body.message_keywords.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin_json() -> String {
        RuleSnapshot::from_tables(&RuleTables::builtin()).unwrap().to_json().unwrap()
    }

    #[test]
    fn builtin_snapshot_loads_back() {
        let snapshot = RuleSnapshot::load(&builtin_json()).unwrap();
        let tables = snapshot.into_tables().unwrap();
        let builtin = RuleTables::builtin();
        assert_eq!(tables.blocklist, builtin.blocklist);
        assert_eq!(tables.embed_hosts, builtin.embed_hosts);
        assert_eq!(tables.suspicious_tlds, builtin.suspicious_tlds);
        assert_eq!(tables.patterns, builtin.patterns);
    }

    #[test]
    fn rejects_wrong_magic_and_version() {
        let mut value: serde_json::Value = serde_json::from_str(&builtin_json()).unwrap();
        value["magic"] = "UBX1".into();
        assert!(matches!(
            RuleSnapshot::load(&value.to_string()),
            Err(SnapshotError::InvalidMagic(m)) if m == "UBX1"
        ));

        let mut value: serde_json::Value = serde_json::from_str(&builtin_json()).unwrap();
        value["version"] = 9.into();
        assert!(matches!(
            RuleSnapshot::load(&value.to_string()),
            Err(SnapshotError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn detects_tampering() {
        let mut value: serde_json::Value = serde_json::from_str(&builtin_json()).unwrap();
        value["body"]["blocklist"][0] = "example.org".into();
        assert!(matches!(
            RuleSnapshot::load(&value.to_string()),
            Err(SnapshotError::Crc32Mismatch { .. })
        ));
    }

    #[test]
    fn rejects_conflicting_tables() {
        let mut tables = RuleTables::default();
        tables.blocklist.insert("both.example").unwrap();
        tables.embed_hosts.insert("both.example").unwrap();
        let json = RuleSnapshot::from_tables(&tables).unwrap().to_json().unwrap();
        let snapshot = RuleSnapshot::load(&json).unwrap();
        assert!(matches!(
            snapshot.into_tables(),
            Err(SnapshotError::Rules(RuleError::Conflict(_)))
        ));
    }

    #[test]
    fn garbage_is_json_error() {
        assert!(matches!(RuleSnapshot::load("ESRT"), Err(SnapshotError::Json(_))));
    }
}
