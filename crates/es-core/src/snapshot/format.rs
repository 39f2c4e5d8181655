//! ESRT Snapshot Format v1

use serde::{Deserialize, Serialize};

use crate::rules::PatternRule;

/// Magic tag: "ESRT"
pub const ESRT_MAGIC: &str = "ESRT";

/// Current format version
pub const ESRT_VERSION: u16 = 1;

/// A complete snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    pub magic: String,
    pub version: u16,
    /// Version stamp of the rule lists the snapshot was built from
    pub list_version: String,
    /// CRC32 of the canonical JSON encoding of `body`
    pub checksum: u32,
    pub body: SnapshotBody,
}

/// Rule data. Domain and keyword lists are sorted and deduplicated, patterns
/// keep table order, so the canonical encoding is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotBody {
    pub blocklist: Vec<String>,
    pub embed_hosts: Vec<String>,
    pub patterns: Vec<PatternRule>,
    pub suspicious_tlds: Vec<String>,
    pub code_keywords: Vec<String>,
    pub message_keywords: Vec<String>,
}
