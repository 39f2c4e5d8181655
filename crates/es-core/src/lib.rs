//! Embed Shield Core Library
//!
//! This crate provides the decision engine for a shielded embed page: a
//! request mediator that sits between a browsing context and the network,
//! and a runtime hardening layer for the script realms it can reach.
//!
//! # Architecture
//!
//! The mediator operates on read-only rule tables (a blocklist, an embed
//! allowlist, redirect URL patterns and suspicious TLDs) loaded either from
//! the builtin set or from a compiled JSON snapshot. Decisions are pure and
//! safe to run concurrently; blocked requests are answered with synthetic
//! responses and top-level escapes with an interstitial page.
//!
//! # Modules
//!
//! - `types`: Shared type definitions (request context, verdicts)
//! - `url`: URL helpers built on the `url` crate
//! - `hash`: Signatures for the response cache and snapshot checksums
//! - `domain`: Suffix walking and hostname heuristics
//! - `rules`: Rule tables and their builtin contents
//! - `classifier`: Domain classification against the rule tables
//! - `patterns`: Compiled redirect URL patterns
//! - `substitute`: Synthetic responses and their cache
//! - `telemetry`: Block events and the sinks that receive them
//! - `messages`: Worker/page message protocol
//! - `navigation`: Top-level navigation guard and interstitial
//! - `config`: Engine configuration
//! - `mediator`: Request interception
//! - `lifecycle`: Install/activate/message lifecycle of the worker
//! - `snapshot`: ESRT rule snapshot format and loader
//! - `hardening`: Runtime hardening of script realms

pub mod classifier;
pub mod config;
pub mod domain;
pub mod hardening;
pub mod hash;
pub mod lifecycle;
pub mod mediator;
pub mod messages;
pub mod navigation;
pub mod patterns;
pub mod rules;
pub mod snapshot;
pub mod substitute;
pub mod telemetry;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use classifier::DomainClassifier;
pub use config::{ConfigError, EngineConfig};
pub use hardening::{install, Capability, CapabilitySet, RealmBinding, Shield};
pub use lifecycle::{Effect, Lifecycle, LifecycleState, SW_VERSION};
pub use mediator::{Mediator, Outcome};
pub use messages::Message;
pub use navigation::{interstitial_html, NavigationGuard};
pub use rules::{PatternRule, RuleError, RuleTables};
pub use snapshot::{RuleSnapshot, SnapshotError};
pub use substitute::SubstituteResponse;
pub use telemetry::{Telemetry, TelemetryEvent, TelemetrySink};
pub use types::{BlockCategory, Decision, RequestContext, Verdict};
