//! Core type definitions for the embed shield
//!
//! These types describe one intercepted request and the verdict the
//! mediator reaches for it. Verdicts are ephemeral and never persisted.

use serde::{Deserialize, Serialize};

use crate::url::{extract_host, extract_scheme, normalize_host};

// =============================================================================
// Request Destinations (bit mask for destination filtering)
// =============================================================================

bitflags::bitflags! {
    /// Request destination bit mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RequestDestination: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const MAIN_FRAME = 1 << 6;   // main document
        const XMLHTTPREQUEST = 1 << 7;
        const WEBSOCKET = 1 << 8;
        const FONT = 1 << 9;
        const MEDIA = 1 << 10;
        const PING = 1 << 11;
        const CSP_REPORT = 1 << 12;
        const BEACON = 1 << 13;
        const FETCH = 1 << 14;
        const WORKER = 1 << 15;

        /// All destinations
        const ALL = 0xFFFF;
        /// Document destinations (main_frame + sub_frame)
        const DOCUMENT = Self::MAIN_FRAME.bits() | Self::SUBDOCUMENT.bits();
        /// Destinations that never render and exist only to phone home
        const TRACKING = Self::PING.bits() | Self::BEACON.bits() | Self::CSP_REPORT.bits();
    }
}

impl RequestDestination {
    /// Parse from a fetch `Request.destination` or a webRequest type string.
    ///
    /// The fetch API reports the empty string for `fetch()`/XHR traffic.
    pub fn from_str(s: &str) -> Self {
        match s {
            "document" | "main_frame" => Self::MAIN_FRAME,
            "iframe" | "frame" | "sub_frame" | "subdocument" => Self::SUBDOCUMENT,
            "style" | "stylesheet" => Self::STYLESHEET,
            "script" | "js" => Self::SCRIPT,
            "image" | "img" => Self::IMAGE,
            "font" => Self::FONT,
            "object" | "embed" => Self::OBJECT,
            "xmlhttprequest" | "xhr" => Self::XMLHTTPREQUEST,
            "" | "fetch" => Self::FETCH,
            "ping" => Self::PING,
            "beacon" => Self::BEACON,
            "report" | "csp_report" => Self::CSP_REPORT,
            "audio" | "video" | "track" | "media" => Self::MEDIA,
            "websocket" | "ws" => Self::WEBSOCKET,
            "worker" | "sharedworker" | "serviceworker" => Self::WORKER,
            _ => Self::OTHER,
        }
    }
}

// =============================================================================
// Request Mode
// =============================================================================

/// Fetch request mode. Only `Navigate` matters for policy, the rest are kept
/// so traces and logs stay faithful to what the host reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestMode {
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
    WebSocket,
}

impl RequestMode {
    pub fn from_str(s: &str) -> Self {
        match s {
            "navigate" => Self::Navigate,
            "same-origin" => Self::SameOrigin,
            "cors" => Self::Cors,
            "websocket" => Self::WebSocket,
            _ => Self::NoCors,
        }
    }
}

// =============================================================================
// Scheme Masks
// =============================================================================

bitflags::bitflags! {
    /// URL scheme mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SchemeMask: u16 {
        const HTTP = 1 << 0;
        const HTTPS = 1 << 1;
        const WS = 1 << 2;
        const WSS = 1 << 3;
        const DATA = 1 << 4;
        const BLOB = 1 << 5;
        const ABOUT = 1 << 6;
        const JAVASCRIPT = 1 << 7;
        const FILE = 1 << 8;
        const FTP = 1 << 9;
        /// Anything with a scheme we do not recognise
        const OTHER = 1 << 15;

        /// Schemes a top-level navigation may legitimately use
        const WEB = Self::HTTP.bits() | Self::HTTPS.bits();
    }
}

// =============================================================================
// Frame position
// =============================================================================

/// Where in the browsing context the request would land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Replaces the primary document the user sees.
    TopLevel,
    /// Loads into a nested frame/iframe.
    Nested,
    /// A sub-resource, never a document.
    Resource,
}

// =============================================================================
// Classification
// =============================================================================

/// Result of the domain classifier for one hostname.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Blocked,
    Allowed,
    Unknown,
}

/// Kind of empty substitute served in place of a blocked resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubstituteKind {
    /// Empty script body
    Script,
    /// 1x1 transparent image
    Image,
    /// Empty stylesheet
    Stylesheet,
    /// Empty HTML document
    Document,
    /// Empty text
    Text,
}

impl SubstituteKind {
    /// Pick a substitute shaped like what the requester expects.
    pub fn for_destination(destination: RequestDestination) -> Self {
        if destination.contains(RequestDestination::SCRIPT) {
            Self::Script
        } else if destination.contains(RequestDestination::IMAGE) {
            Self::Image
        } else if destination.contains(RequestDestination::STYLESHEET) {
            Self::Stylesheet
        } else if destination.intersects(RequestDestination::DOCUMENT) {
            Self::Document
        } else {
            Self::Text
        }
    }
}

/// Final decision for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Request proceeds unmodified
    Allow,
    /// Request is cancelled with an empty response
    BlockSilent,
    /// Request is answered with an empty payload of the expected kind
    BlockSubstitute(SubstituteKind),
    /// Navigation is replaced with the interstitial document
    BlockNavigation,
}

impl Decision {
    #[inline]
    pub fn is_block(&self) -> bool {
        !matches!(self, Self::Allow)
    }
}

/// Which rule family fired. Also the category tag of telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "kebab-case")]
pub enum BlockCategory {
    Scheme,
    Domain,
    Pattern,
    Navigation,
    Iframe,
    SuspiciousTld,
    Popup,
    Location,
    DynamicCode,
    Timer,
    Resource,
    Dom,
    Permission,
    Message,
    HardeningGap,
}

impl BlockCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheme => "scheme",
            Self::Domain => "domain",
            Self::Pattern => "pattern",
            Self::Navigation => "navigation",
            Self::Iframe => "iframe",
            Self::SuspiciousTld => "suspicious-tld",
            Self::Popup => "popup",
            Self::Location => "location",
            Self::DynamicCode => "dynamic-code",
            Self::Timer => "timer",
            Self::Resource => "resource",
            Self::Dom => "dom",
            Self::Permission => "permission",
            Self::Message => "message",
            Self::HardeningGap => "hardening-gap",
        }
    }
}

// =============================================================================
// Request Context
// =============================================================================

/// Context for a request being mediated.
#[derive(Debug, Clone)]
pub struct RequestContext<'a> {
    /// Full request URL
    pub url: &'a str,
    /// Normalized request hostname (lowercase, no `www.`), empty if unparsable
    pub req_host: String,
    /// URL scheme, `None` if the URL has no recognisable scheme
    pub scheme: Option<SchemeMask>,
    /// Fetch mode
    pub mode: RequestMode,
    /// Fetch destination
    pub destination: RequestDestination,
    /// Referer header as reported by the host. Recorded, never consulted.
    pub referrer: Option<&'a str>,
}

impl<'a> RequestContext<'a> {
    pub fn new(url: &'a str, mode: RequestMode, destination: RequestDestination) -> Self {
        let req_host = extract_host(url).map(normalize_host).unwrap_or_default();
        Self {
            url,
            req_host,
            scheme: extract_scheme(url),
            mode,
            destination,
            referrer: None,
        }
    }

    /// Build from the raw strings a fetch event carries.
    pub fn from_fetch(url: &'a str, mode: &str, destination: &str) -> Self {
        Self::new(url, RequestMode::from_str(mode), RequestDestination::from_str(destination))
    }

    pub fn with_referrer(mut self, referrer: Option<&'a str>) -> Self {
        self.referrer = referrer.filter(|r| !r.is_empty());
        self
    }

    /// Position of the request in the frame tree.
    pub fn frame_kind(&self) -> FrameKind {
        let navigate = self.mode == RequestMode::Navigate;
        if self.destination.contains(RequestDestination::SUBDOCUMENT)
            || (navigate && self.destination.contains(RequestDestination::OBJECT))
        {
            // <object>/<embed> browsing contexts sit inside the page.
            FrameKind::Nested
        } else if self.destination.contains(RequestDestination::MAIN_FRAME)
            || (navigate && self.destination.intersects(RequestDestination::FETCH | RequestDestination::OTHER))
        {
            // Navigate mode with an empty or unknown destination replaces the
            // primary document.
            FrameKind::TopLevel
        } else {
            FrameKind::Resource
        }
    }

    /// True when the request is a navigation of any frame.
    #[inline]
    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate || self.destination.intersects(RequestDestination::DOCUMENT)
    }
}

// =============================================================================
// Verdict
// =============================================================================

/// Result of mediating a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The final decision for this request
    pub decision: Decision,
    /// Rule family that determined the decision, `None` for allow
    pub category: Option<BlockCategory>,
    /// Pattern rule id when a pattern fired (for logging)
    pub rule_id: Option<String>,
}

impl Verdict {
    pub fn block(decision: Decision, category: BlockCategory) -> Self {
        Self {
            decision,
            category: Some(category),
            rule_id: None,
        }
    }
}

impl Default for Verdict {
    fn default() -> Self {
        Self {
            decision: Decision::Allow,
            category: None,
            rule_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_from_fetch_strings() {
        assert_eq!(RequestDestination::from_str("document"), RequestDestination::MAIN_FRAME);
        assert_eq!(RequestDestination::from_str("iframe"), RequestDestination::SUBDOCUMENT);
        assert_eq!(RequestDestination::from_str(""), RequestDestination::FETCH);
        assert_eq!(RequestDestination::from_str("video"), RequestDestination::MEDIA);
        assert_eq!(RequestDestination::from_str("nonsense"), RequestDestination::OTHER);
    }

    #[test]
    fn substitute_kind_follows_destination() {
        assert_eq!(SubstituteKind::for_destination(RequestDestination::SCRIPT), SubstituteKind::Script);
        assert_eq!(SubstituteKind::for_destination(RequestDestination::IMAGE), SubstituteKind::Image);
        assert_eq!(SubstituteKind::for_destination(RequestDestination::SUBDOCUMENT), SubstituteKind::Document);
        assert_eq!(SubstituteKind::for_destination(RequestDestination::FETCH), SubstituteKind::Text);
    }

    #[test]
    fn frame_kind() {
        let top = RequestContext::from_fetch("https://a.com/", "navigate", "document");
        assert_eq!(top.frame_kind(), FrameKind::TopLevel);

        let nested = RequestContext::from_fetch("https://a.com/", "navigate", "iframe");
        assert_eq!(nested.frame_kind(), FrameKind::Nested);

        let script = RequestContext::from_fetch("https://a.com/x.js", "no-cors", "script");
        assert_eq!(script.frame_kind(), FrameKind::Resource);
    }

    #[test]
    fn object_and_embed_navigations_are_nested() {
        for destination in ["object", "embed"] {
            let ctx = RequestContext::from_fetch("https://a.com/e/1", "navigate", destination);
            assert_eq!(ctx.frame_kind(), FrameKind::Nested, "{destination}");
        }
        let plain = RequestContext::from_fetch("https://a.com/e/1", "no-cors", "object");
        assert_eq!(plain.frame_kind(), FrameKind::Resource);

        for destination in ["", "unknown-kind"] {
            let ctx = RequestContext::from_fetch("https://a.com/", "navigate", destination);
            assert_eq!(ctx.frame_kind(), FrameKind::TopLevel, "{destination:?}");
        }
    }

    #[test]
    fn context_normalizes_host() {
        let ctx = RequestContext::from_fetch("https://WWW.Example.COM/path", "cors", "");
        assert_eq!(ctx.req_host, "example.com");
        assert_eq!(ctx.scheme, Some(SchemeMask::HTTPS));
    }

    #[test]
    fn empty_referrer_is_dropped() {
        let ctx = RequestContext::from_fetch("https://a.com/", "navigate", "document").with_referrer(Some(""));
        assert!(ctx.referrer.is_none());
    }

    #[test]
    fn category_strings_match_serde() {
        let json = serde_json::to_string(&BlockCategory::SuspiciousTld).unwrap();
        assert_eq!(json, format!("\"{}\"", BlockCategory::SuspiciousTld.as_str()));
    }
}
