//! Per-document shield state.

use regex::RegexSet;

use crate::config::ConfigError;
use crate::rules::{RuleError, RuleTables};
use crate::url::{canonical_origin, origin_of_parsed, resolve};

/// Case-insensitive substring set used to inspect code and message payloads.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    keywords: Vec<String>,
    set: RegexSet,
}

impl KeywordSet {
    pub fn new<S: AsRef<str>>(keywords: &[S]) -> Result<Self, RuleError> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.as_ref().trim().to_ascii_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        let set = RegexSet::new(keywords.iter().map(|k| format!("(?i){}", regex::escape(k)))).map_err(|source| {
            RuleError::InvalidPattern {
                id: "<keywords>".to_string(),
                source,
            }
        })?;
        Ok(Self { keywords, set })
    }

    /// First keyword (in list order) contained in `text`.
    pub fn find(&self, text: &str) -> Option<&str> {
        let hit = self.set.matches(text).into_iter().next()?;
        self.keywords.get(hit).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// State created when the shield is installed into a document. Lives as
/// long as the document; there is no teardown.
#[derive(Debug, Clone)]
pub struct ShieldState {
    self_origin: String,
    document_url: String,
    base_url: String,
    code_keywords: KeywordSet,
    message_keywords: KeywordSet,
}

impl ShieldState {
    pub fn new(document_url: &str, tables: &RuleTables) -> Result<Self, ConfigError> {
        Self::inheriting(document_url, None, tables)
    }

    /// State for a document whose URL may carry no origin of its own.
    /// `about:blank` and `srcdoc` frames take `inherited_origin` from their
    /// creator and resolve relative targets against it.
    pub fn inheriting(
        document_url: &str,
        inherited_origin: Option<&str>,
        tables: &RuleTables,
    ) -> Result<Self, ConfigError> {
        let (self_origin, base_url) = match canonical_origin(document_url) {
            Some(origin) => (origin, document_url.to_string()),
            None => {
                let origin = inherited_origin
                    .and_then(canonical_origin)
                    .ok_or_else(|| ConfigError::InvalidOrigin(document_url.to_string()))?;
                let base = format!("{origin}/");
                (origin, base)
            }
        };
        Ok(Self {
            self_origin,
            document_url: document_url.to_string(),
            base_url,
            code_keywords: KeywordSet::new(&tables.code_keywords)?,
            message_keywords: KeywordSet::new(&tables.message_keywords)?,
        })
    }

    pub fn self_origin(&self) -> &str {
        &self.self_origin
    }

    pub fn document_url(&self) -> &str {
        &self.document_url
    }

    pub fn code_keywords(&self) -> &KeywordSet {
        &self.code_keywords
    }

    pub fn message_keywords(&self) -> &KeywordSet {
        &self.message_keywords
    }

    /// Does `target`, resolved against the document, stay on our origin?
    /// Unresolvable and opaque targets do not.
    pub fn is_same_origin(&self, target: &str) -> bool {
        resolve(&self.base_url, target)
            .and_then(|url| origin_of_parsed(&url))
            .is_some_and(|origin| origin == self.self_origin)
    }
}
