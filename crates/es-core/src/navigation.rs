//! Navigation Guard
//!
//! Holds the single-origin invariant for the top-level document: its origin
//! is always the application's own origin. A top-level load to any other
//! origin is an escape attempt and is answered with the interstitial, which
//! returns the session to the previous history entry.
//!
//! The guard never looks at the Referer. Third-party script can navigate
//! without one, so every non-self-origin top-level load is blocked.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::config::ConfigError;
use crate::url::{canonical_origin, origin_of};

/// Guard state for one browsing context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Initial and only legitimate state.
    OnSelfOrigin,
    /// Transient; remediated before the interstitial is returned.
    EscapeAttempted,
}

impl GuardState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::EscapeAttempted,
            _ => Self::OnSelfOrigin,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::OnSelfOrigin => 0,
            Self::EscapeAttempted => 1,
        }
    }
}

#[derive(Debug)]
pub struct NavigationGuard {
    self_origin: String,
    state: AtomicU8,
    escapes: AtomicU64,
}

impl NavigationGuard {
    /// Create a guard for the given application origin. Any URL on that
    /// origin is accepted and reduced to its origin.
    pub fn new(self_origin: &str) -> Result<Self, ConfigError> {
        let origin = canonical_origin(self_origin)
            .ok_or_else(|| ConfigError::InvalidOrigin(self_origin.to_string()))?;
        Ok(Self {
            self_origin: origin,
            state: AtomicU8::new(GuardState::OnSelfOrigin.as_u8()),
            escapes: AtomicU64::new(0),
        })
    }

    pub fn self_origin(&self) -> &str {
        &self.self_origin
    }

    /// Does `url` resolve to the application origin?
    pub fn is_self_origin(&self, url: &str) -> bool {
        origin_of(url).is_some_and(|origin| origin == self.self_origin)
    }

    /// Would a top-level load of `url` leave the application origin?
    /// Unparsable targets count as escapes.
    #[inline]
    pub fn is_escape(&self, url: &str) -> bool {
        !self.is_self_origin(url)
    }

    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Escape attempts seen over the life of the context.
    pub fn escapes(&self) -> u64 {
        self.escapes.load(Ordering::Relaxed)
    }

    /// Record an escape attempt and remediate it, returning the interstitial
    /// to serve in place of the real document.
    pub fn remediate(&self, hostname: &str) -> String {
        self.state.store(GuardState::EscapeAttempted.as_u8(), Ordering::Release);
        let count = self.escapes.fetch_add(1, Ordering::Relaxed) + 1;
        log::warn!("blocked top-level navigation to {hostname} (escape #{count})");

        let page = interstitial_html(hostname);
        self.state.store(GuardState::OnSelfOrigin.as_u8(), Ordering::Release);
        page
    }
}

// =============================================================================
// Interstitial
// =============================================================================

/// Substitute document for a blocked navigation. On load it notifies the
/// parent document, then goes back one history entry, or to the application
/// root when there is none.
pub fn interstitial_html(hostname: &str) -> String {
    let display = escape_html(hostname);
    let literal = script_string(hostname);
    format!(
        r#"<!DOCTYPE html><html><head><meta charset="utf-8"><title>Blocked</title>
<style>body{{background:#07090d;color:#e8c96d;font-family:sans-serif;display:flex;align-items:center;justify-content:center;min-height:100vh;flex-direction:column;gap:16px}}h1{{font-size:18px;letter-spacing:2px}}p{{color:#5a6478;font-size:13px}}a{{color:#e8c96d}}</style></head>
<body><h1>REDIRECT BLOCKED</h1><p>Blocked a redirect to: {display}</p><p><a href="/">Back</a></p>
<script>(function(){{try{{window.parent.postMessage({{type:"RW_BLOCKED",category:"navigation",hostname:{literal}}},"*")}}catch(e){{}}if(history.length>1){{history.back()}}else{{location.replace("/")}}}})();</script>
</body></html>"#
    )
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Quoted JS string literal that cannot close the surrounding script element.
fn script_string(text: &str) -> String {
    let quoted = serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string());
    quoted.replace('<', "\\u003c").replace('>', "\\u003e")
}
