//! Request Mediator
//!
//! This is the hot path: every request and navigation of the browsing
//! context passes through here before it reaches the network.
//!
//! `decide` is pure. Rule tables are read-only after construction, so the
//! host may run any number of decisions concurrently. `handle` adds the side
//! effects: telemetry, the navigation guard transition and the substitute
//! response.

use std::sync::Arc;

use crate::classifier::DomainClassifier;
use crate::config::{ConfigError, EngineConfig};
use crate::hash::Signature;
use crate::navigation::NavigationGuard;
use crate::patterns::PatternMatcher;
use crate::rules::RuleTables;
use crate::substitute::{ResponseCache, SubstituteResponse};
use crate::telemetry::Telemetry;
use crate::types::{
    BlockCategory, Classification, Decision, FrameKind, RequestContext, SchemeMask, SubstituteKind, Verdict,
};
use crate::url::{extract_host, extract_scheme, normalize_host};

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Let the request reach the network unmodified.
    PassThrough,
    /// Answer with this response instead.
    Respond(Arc<SubstituteResponse>),
}

impl Outcome {
    pub fn response(&self) -> Option<&SubstituteResponse> {
        match self {
            Self::PassThrough => None,
            Self::Respond(response) => Some(response),
        }
    }
}

// =============================================================================
// Mediator
// =============================================================================

/// The interception layer for one browsing context.
pub struct Mediator {
    list_version: String,
    classifier: DomainClassifier,
    patterns: PatternMatcher,
    guard: NavigationGuard,
    telemetry: Telemetry,
    cache: ResponseCache,
}

impl Mediator {
    /// Build a mediator over the given tables. Embed hosts from the config
    /// are merged into the allowlist; one that is also blocked is an error.
    pub fn new(tables: &RuleTables, config: &EngineConfig, telemetry: Telemetry) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut tables = tables.clone();
        for host in &config.embed_hosts {
            tables.add_embed_host(host)?;
        }
        tables.validate()?;

        let patterns = PatternMatcher::new(&tables.patterns)?;
        let guard = NavigationGuard::new(&config.self_origin)?;

        log::info!(
            "mediator ready: origin={} list={} blocked={} embed={} patterns={}",
            guard.self_origin(),
            tables.list_version,
            tables.blocklist.len(),
            tables.embed_hosts.len(),
            patterns.len()
        );

        Ok(Self {
            list_version: tables.list_version.clone(),
            classifier: DomainClassifier::new(&tables),
            patterns,
            guard,
            telemetry,
            cache: ResponseCache::new(config.response_cache_capacity),
        })
    }

    /// Mediator over the builtin tables.
    pub fn with_builtin(config: &EngineConfig, telemetry: Telemetry) -> Result<Self, ConfigError> {
        Self::new(&RuleTables::builtin(), config, telemetry)
    }

    /// Decide a request. First matching rule wins.
    pub fn decide(&self, ctx: &RequestContext<'_>) -> Verdict {
        let frame = ctx.frame_kind();

        // A0: Malformed input passes through, except at top level
        let scheme = match ctx.scheme {
            Some(scheme) => scheme,
            None if frame == FrameKind::TopLevel => {
                return Verdict::block(Decision::BlockNavigation, BlockCategory::Navigation);
            }
            None => return Verdict::default(),
        };

        // A1: Non-web scheme as a navigation target
        if ctx.is_navigation() && !SchemeMask::WEB.contains(scheme) {
            return Verdict::block(Decision::BlockNavigation, BlockCategory::Scheme);
        }

        if ctx.req_host.is_empty() {
            return if frame == FrameKind::TopLevel {
                Verdict::block(Decision::BlockNavigation, BlockCategory::Navigation)
            } else {
                Verdict::default()
            };
        }

        let classification = self.classifier.classify_normalized(&ctx.req_host);

        // A2: Blocked hostname
        if classification == Classification::Blocked {
            let verdict = match frame {
                FrameKind::TopLevel => Verdict::block(Decision::BlockNavigation, BlockCategory::Domain),
                FrameKind::Nested => Verdict::block(
                    Decision::BlockSubstitute(SubstituteKind::Document),
                    BlockCategory::Iframe,
                ),
                FrameKind::Resource => Verdict::block(
                    Decision::BlockSubstitute(SubstituteKind::for_destination(ctx.destination)),
                    BlockCategory::Domain,
                ),
            };
            return verdict;
        }

        // A3: Redirect-shaped URL off our origin and off the embed hosts
        if classification != Classification::Allowed && !self.guard.is_self_origin(ctx.url) {
            if let Some(rule) = self.patterns.first_match(ctx.url) {
                let decision = if frame == FrameKind::TopLevel {
                    Decision::BlockNavigation
                } else {
                    Decision::BlockSilent
                };
                return Verdict {
                    decision,
                    category: Some(BlockCategory::Pattern),
                    rule_id: Some(rule.id.clone()),
                };
            }
        }

        // A4: Top-level load off our origin, embed hosts included
        if frame == FrameKind::TopLevel && self.guard.is_escape(ctx.url) {
            return Verdict::block(Decision::BlockNavigation, BlockCategory::Navigation);
        }

        // A5: Nested frame on a machine-generated host under an abused TLD
        if frame == FrameKind::Nested
            && classification == Classification::Unknown
            && self.classifier.is_suspicious(&ctx.req_host)
        {
            return Verdict::block(Decision::BlockSilent, BlockCategory::SuspiciousTld);
        }

        // A6: Fail open
        Verdict::default()
    }

    /// Decide a request and carry out the decision.
    pub fn handle(&self, ctx: &RequestContext<'_>) -> Outcome {
        let verdict = self.decide(ctx);
        let category = match (verdict.decision, verdict.category) {
            (Decision::Allow, _) | (_, None) => return Outcome::PassThrough,
            (_, Some(category)) => category,
        };

        let detail = if ctx.req_host.is_empty() { ctx.url } else { ctx.req_host.as_str() };
        log::debug!(
            "{:?} [{}{}] {}",
            verdict.decision,
            category.as_str(),
            verdict.rule_id.as_deref().map(|id| format!(":{id}")).unwrap_or_default(),
            ctx.url
        );
        self.telemetry.report(category, detail);

        let response = match verdict.decision {
            Decision::BlockSilent => {
                let key = Signature::of(&["silent", category.as_str()]);
                self.cache
                    .get_or_insert_with(key, || SubstituteResponse::no_content(category))
            }
            Decision::BlockSubstitute(kind) => {
                let key = Signature::of(&[substitute_tag(kind), category.as_str()]);
                self.cache
                    .get_or_insert_with(key, || SubstituteResponse::empty(kind, category))
            }
            Decision::BlockNavigation => {
                let page = self.guard.remediate(detail);
                Arc::new(SubstituteResponse::html(page, category))
            }
            Decision::Allow => return Outcome::PassThrough,
        };
        Outcome::Respond(response)
    }

    /// May the wrapper page frame this URL? Only web URLs on an embed host
    /// qualify; anything unparsable is rejected.
    pub fn validate_embed_url(&self, url: &str) -> bool {
        let web = extract_scheme(url).is_some_and(|s| SchemeMask::WEB.contains(s));
        web && extract_host(url)
            .map(normalize_host)
            .is_some_and(|host| self.classifier.classify_normalized(&host) == Classification::Allowed)
    }

    pub fn classifier(&self) -> &DomainClassifier {
        &self.classifier
    }

    pub fn patterns(&self) -> &PatternMatcher {
        &self.patterns
    }

    pub fn guard(&self) -> &NavigationGuard {
        &self.guard
    }

    pub fn self_origin(&self) -> &str {
        self.guard.self_origin()
    }

    pub fn list_version(&self) -> &str {
        &self.list_version
    }

    pub fn cached_responses(&self) -> usize {
        self.cache.len()
    }
}

fn substitute_tag(kind: SubstituteKind) -> &'static str {
    match kind {
        SubstituteKind::Script => "script",
        SubstituteKind::Image => "image",
        SubstituteKind::Stylesheet => "stylesheet",
        SubstituteKind::Document => "document",
        SubstituteKind::Text => "text",
    }
}
