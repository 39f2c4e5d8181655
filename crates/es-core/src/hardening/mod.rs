//! Runtime Hardening Layer
//!
//! Defense in depth for documents the shield can reach: every JavaScript API
//! able to navigate, open a window, run string code or send traffic is
//! wrapped so that escape attempts die inside the page, even when they never
//! produce a request the mediator could see.
//!
//! The layer is split in two. This crate owns the policy: a capability
//! interception table mapping each API to a wrapper composed over its
//! original, and the `ShieldPolicy` those wrappers consult. A
//! [`RealmBinding`] applies the table to a live script realm. Installation
//! is a single synchronous pass and must run before any other script in the
//! document.
//!
//! A cross-origin realm cannot be patched. That is reported as a
//! `hardening-gap` event and the mediator remains the only control for it.

mod capability;
mod dom;
mod frame_stub;
mod inject;
mod install;
mod policy;
mod state;
mod table;

use std::sync::Arc;

pub use capability::{Capability, CapabilitySet};
pub use dom::{ElementInfo, Position, Removal, SweepSchedule};
pub use frame_stub::{is_navigating_write, read as read_stub, StubKind, StubValue, ANCESTOR, CLOSED_WINDOW};
pub use inject::{inject_into_head, script_tag};
pub use install::{install, InstallOutcome, Installation, PatchError, RealmBinding};
pub use policy::{Action, Call, ShieldPolicy};
pub use state::{KeywordSet, ShieldState};
pub use table::{hook, InterceptionTable, Interceptor};

use crate::classifier::DomainClassifier;
use crate::config::{ConfigError, EngineConfig, SweepConfig};
use crate::rules::RuleTables;
use crate::telemetry::Telemetry;

/// Policy plus interception table for one document.
pub struct Shield {
    policy: ShieldPolicy,
    table: InterceptionTable,
    sweep: SweepConfig,
}

impl Shield {
    pub fn new(policy: ShieldPolicy, table: InterceptionTable, sweep: SweepConfig) -> Self {
        Self { policy, table, sweep }
    }

    /// Shield for the document at `document_url`, intercepting everything.
    pub fn for_document(
        document_url: &str,
        tables: &RuleTables,
        config: &EngineConfig,
        telemetry: Telemetry,
    ) -> Result<Self, ConfigError> {
        Self::for_document_inheriting(document_url, None, tables, config, telemetry)
    }

    /// Like [`Shield::for_document`], for `about:blank` and `srcdoc` frames
    /// that take their origin from the creator.
    pub fn for_document_inheriting(
        document_url: &str,
        inherited_origin: Option<&str>,
        tables: &RuleTables,
        config: &EngineConfig,
        telemetry: Telemetry,
    ) -> Result<Self, ConfigError> {
        let mut tables = tables.clone();
        for host in &config.embed_hosts {
            tables.add_embed_host(host)?;
        }
        let state = ShieldState::inheriting(document_url, inherited_origin, &tables)?;
        let classifier = Arc::new(DomainClassifier::new(&tables));
        let policy = ShieldPolicy::new(state, classifier, config.overlay, telemetry);
        Ok(Self::new(
            policy,
            InterceptionTable::with_policy_hooks(CapabilitySet::EVERYTHING),
            config.sweep.clone(),
        ))
    }

    /// Run the wrapper for `capability`. Capabilities without an entry are
    /// forwarded untouched.
    pub fn intercept(&self, capability: Capability, call: &Call<'_>) -> Action {
        match self.table.get(capability) {
            Some(interceptor) => interceptor(&self.policy, call),
            None => Action::Forward,
        }
    }

    pub fn policy(&self) -> &ShieldPolicy {
        &self.policy
    }

    pub fn table(&self) -> &InterceptionTable {
        &self.table
    }

    pub fn sweep_schedule(&self) -> SweepSchedule {
        SweepSchedule::new(&self.sweep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{RecordingSink, DEFAULT_DETAIL_CHARS};
    use crate::types::BlockCategory;

    fn shield() -> (Shield, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let shield = Shield::for_document(
            "https://app.example/frame?id=603",
            &RuleTables::builtin(),
            &EngineConfig::for_origin("https://app.example"),
            Telemetry::new(sink.clone(), DEFAULT_DETAIL_CHARS),
        )
        .unwrap();
        (shield, sink)
    }

    #[test]
    fn window_open_returns_closed_stub() {
        let (shield, sink) = shield();
        let action = shield.intercept(Capability::WindowOpen, &Call::Open { url: Some("https://x.com") });
        assert_eq!(action, Action::Value(CLOSED_WINDOW));
        assert_eq!(sink.events()[0].category, BlockCategory::Popup);
    }

    #[test]
    fn opener_and_name_are_pinned() {
        let (shield, _) = shield();
        assert_eq!(shield.intercept(Capability::Opener, &Call::Read), Action::Value(StubValue::Null));
        assert_eq!(shield.intercept(Capability::WindowName, &Call::Read), Action::Value(StubValue::Str("")));
        assert_eq!(shield.intercept(Capability::WindowName, &Call::Write), Action::Drop);
    }

    #[test]
    fn navigation_locked_to_own_origin() {
        let (shield, sink) = shield();
        let nav = |target| Call::Navigate { target };
        assert_eq!(shield.intercept(Capability::LocationAssign, &nav("/title/603")), Action::Forward);
        assert_eq!(shield.intercept(Capability::LocationHref, &nav("https://app.example/")), Action::Forward);
        assert_eq!(shield.intercept(Capability::LocationReplace, &nav("https://ad.example/")), Action::Drop);
        assert_eq!(shield.intercept(Capability::LocationHref, &nav("javascript:open()")), Action::Drop);
        assert_eq!(shield.intercept(Capability::LocationReload, &Call::Reload), Action::Forward);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.events()[0].category, BlockCategory::Location);
    }

    #[test]
    fn srcdoc_frame_uses_inherited_origin() {
        let config = EngineConfig::for_origin("https://app.example");
        assert!(Shield::for_document("about:srcdoc", &RuleTables::builtin(), &config, Telemetry::null()).is_err());

        let shield = Shield::for_document_inheriting(
            "about:srcdoc",
            Some("https://app.example"),
            &RuleTables::builtin(),
            &config,
            Telemetry::null(),
        )
        .unwrap();
        let nav = |target| Call::Navigate { target };
        assert_eq!(shield.intercept(Capability::LocationAssign, &nav("/title/603")), Action::Forward);
        assert_eq!(shield.intercept(Capability::LocationHref, &nav("https://ad.example/")), Action::Drop);
    }

    #[test]
    fn ancestors_are_spoofed() {
        let (shield, _) = shield();
        assert_eq!(shield.intercept(Capability::Top, &Call::Read), Action::Value(ANCESTOR));
        assert_eq!(shield.intercept(Capability::Parent, &Call::Read), Action::Value(ANCESTOR));
    }

    #[test]
    fn stub_location_writes_are_reported() {
        let (shield, sink) = shield();
        let policy = shield.policy();
        assert_eq!(policy.stub_write(StubKind::Ancestor, "location", Some("https://ad.example/")), Action::Drop);
        assert_eq!(policy.stub_write(StubKind::Location, "href", Some("https://ad.example/x")), Action::Drop);
        assert_eq!(policy.stub_write(StubKind::ClosedWindow, "name", Some("x")), Action::Drop);

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.category == BlockCategory::Location));
        assert_eq!(events[0].hostname, "https://ad.example/");
    }

    #[test]
    fn dynamic_code_and_timers() {
        let (shield, sink) = shield();
        let code = |source| Call::Code { source };
        assert_eq!(shield.intercept(Capability::Eval, &code(Some("loadPopunder()"))), Action::Drop);
        assert_eq!(shield.intercept(Capability::Eval, &code(Some("1 + 1"))), Action::Forward);
        assert_eq!(shield.intercept(Capability::FunctionCtor, &code(None)), Action::Forward);

        let timer = |source| Call::Timer { source };
        assert_eq!(
            shield.intercept(Capability::SetTimeout, &timer(Some("window.open('https://ad')"))),
            Action::Drop
        );
        assert_eq!(shield.intercept(Capability::SetInterval, &timer(None)), Action::Forward);

        let categories: Vec<_> = sink.events().iter().map(|e| e.category).collect();
        assert_eq!(categories, vec![BlockCategory::DynamicCode, BlockCategory::Timer]);
    }

    #[test]
    fn traffic_to_blocked_hosts_is_dropped() {
        let (shield, sink) = shield();
        let req = |url| Call::Request { url };
        assert_eq!(
            shield.intercept(Capability::Fetch, &req("https://securepubads.g.doubleclick.net/gampad")),
            Action::Drop
        );
        assert_eq!(shield.intercept(Capability::SendBeacon, &req("//www.google-analytics.example/c")), Action::Forward);
        assert_eq!(shield.intercept(Capability::ImgSrc, &req("/poster.jpg")), Action::Forward);
        assert_eq!(shield.intercept(Capability::WebSocket, &req("wss://ws.adsterra.com/")), Action::Drop);
        assert_eq!(sink.events()[0].hostname, "securepubads.g.doubleclick.net");
        assert_eq!(sink.events()[0].category, BlockCategory::Resource);
    }

    #[test]
    fn messages_and_anchor_clicks() {
        let (shield, _) = shield();
        let msg = |payload| Call::Message { payload };
        assert_eq!(shield.intercept(Capability::PostMessage, &msg(r#"{"cmd":"location.href=x"}"#)), Action::Drop);
        assert_eq!(shield.intercept(Capability::PostMessage, &msg(r#"{"event":"timeupdate"}"#)), Action::Forward);

        let click = |href, target| Call::AnchorClick { href, target };
        assert_eq!(shield.intercept(Capability::AnchorClick, &click("https://ad.example/", "")), Action::Drop);
        assert_eq!(shield.intercept(Capability::AnchorClick, &click("/title/1", "_blank")), Action::Drop);
        assert_eq!(shield.intercept(Capability::AnchorClick, &click("/title/1", "")), Action::Forward);
        assert_eq!(shield.intercept(Capability::AnchorClick, &click("#chapters", "")), Action::Forward);
    }

    #[test]
    fn ambient_capabilities_denied() {
        let (shield, _) = shield();
        assert_eq!(shield.intercept(Capability::NotificationPermission, &Call::Ambient), Action::Deny);
        assert_eq!(shield.intercept(Capability::ServiceWorkerRegister, &Call::Ambient), Action::Deny);
        assert_eq!(shield.intercept(Capability::Geolocation, &Call::Ambient), Action::Drop);
        assert_eq!(shield.intercept(Capability::HistoryPushState, &Call::History), Action::Drop);
        assert_eq!(shield.intercept(Capability::BeforeUnload, &Call::BeforeUnload), Action::Drop);
    }

    #[test]
    fn dom_elements() {
        let (shield, _) = shield();
        let ad_frame = ElementInfo {
            tag: "iframe".into(),
            src: Some("https://ads.exoclick.com/frame".into()),
            ..ElementInfo::default()
        };
        assert_eq!(
            shield.intercept(Capability::DomObserver, &Call::Element(&ad_frame)),
            Action::Remove(Removal::BlockedSource)
        );

        let overlay = ElementInfo {
            tag: "div".into(),
            position: Position::Fixed,
            z_index: Some(2147483647),
            width: 1280.0,
            height: 720.0,
            viewport_width: 1280.0,
            viewport_height: 720.0,
            ..ElementInfo::default()
        };
        assert_eq!(
            shield.intercept(Capability::DomSweep, &Call::Element(&overlay)),
            Action::Remove(Removal::Overlay)
        );

        let player = ElementInfo {
            tag: "video".into(),
            src: Some("blob:https://app.example/1".into()),
            ..ElementInfo::default()
        };
        assert_eq!(shield.intercept(Capability::DomObserver, &Call::Element(&player)), Action::Forward);
    }

    #[test]
    fn removed_entries_forward() {
        let (mut shield, _) = shield();
        shield.table.remove(Capability::WindowOpen);
        assert_eq!(
            shield.intercept(Capability::WindowOpen, &Call::Open { url: None }),
            Action::Forward
        );
    }
}
