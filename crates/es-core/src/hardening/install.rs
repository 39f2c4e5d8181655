//! Installing a shield into a script realm.

use std::collections::HashMap;
use std::sync::Arc;

use crate::messages::Message;
use crate::types::BlockCategory;

use super::capability::{Capability, CapabilitySet};
use super::Shield;

/// Why a single capability could not be patched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("'{0}' is not present in this realm")]
    Missing(Capability),
    #[error("'{0}' is not configurable")]
    Locked(Capability),
    #[error("patching '{capability}' failed: {reason}")]
    Host { capability: Capability, reason: String },
}

/// A live script realm the shield can be applied to.
pub trait RealmBinding {
    /// Handle to an API's unpatched implementation.
    type Original: Clone;

    /// Origin of the realm's document, `None` when the realm cannot be
    /// reached (cross-origin).
    fn origin(&self) -> Option<String>;

    /// Current implementation of a capability, before patching.
    fn capture(&mut self, capability: Capability) -> Option<Self::Original>;

    /// Replace a capability with a wrapper that consults `shield` and falls
    /// through to `original` on `Action::Forward`.
    fn patch(
        &mut self,
        capability: Capability,
        shield: &Arc<Shield>,
        original: Option<&Self::Original>,
    ) -> Result<(), PatchError>;

    /// Post a message to the parent document. Best effort.
    fn post_to_parent(&self, message: &Message);
}

/// A completed installation.
#[derive(Debug)]
pub struct Installation<O> {
    /// Unpatched implementations, keyed by capability
    pub originals: HashMap<Capability, O>,
    pub installed: CapabilitySet,
    /// Capabilities the realm refused or lacks
    pub gaps: CapabilitySet,
}

#[derive(Debug)]
pub enum InstallOutcome<O> {
    Installed(Installation<O>),
    /// The realm is unreachable; only the network layer protects it.
    CrossOrigin,
}

impl<O> InstallOutcome<O> {
    pub fn installation(&self) -> Option<&Installation<O>> {
        match self {
            Self::Installed(installation) => Some(installation),
            Self::CrossOrigin => None,
        }
    }
}

/// Apply every capability in the shield's table to `realm`, in order, in a
/// single pass. Never fails: unpatchable capabilities become gaps.
pub fn install<R: RealmBinding>(realm: &mut R, shield: &Arc<Shield>) -> InstallOutcome<R::Original> {
    let telemetry = shield.policy().telemetry();

    let Some(origin) = realm.origin() else {
        log::warn!("hardening skipped: realm is cross-origin");
        telemetry.report(BlockCategory::HardeningGap, "cross-origin realm");
        return InstallOutcome::CrossOrigin;
    };

    let mut installation = Installation {
        originals: HashMap::new(),
        installed: CapabilitySet::empty(),
        gaps: CapabilitySet::empty(),
    };

    for cap in shield.table().capabilities().capabilities() {
        let original = realm.capture(cap);
        match realm.patch(cap, shield, original.as_ref()) {
            Ok(()) => installation.installed.add(cap),
            Err(PatchError::Missing(_)) => {
                log::debug!("{cap} not present in {origin}");
                installation.gaps.add(cap);
            }
            Err(e) => {
                log::warn!("{e}");
                installation.gaps.add(cap);
            }
        }
        if let Some(original) = original {
            installation.originals.insert(cap, original);
        }
    }

    log::info!(
        "shield installed in {origin}: {} capabilities, {} gaps",
        installation.installed.capabilities().count(),
        installation.gaps.capabilities().count()
    );
    realm.post_to_parent(&Message::RwShieldReady);
    InstallOutcome::Installed(installation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::hardening::{Action, Call, StubKind, StubValue};
    use crate::rules::RuleTables;
    use crate::telemetry::{RecordingSink, Telemetry, DEFAULT_DETAIL_CHARS};
    use std::cell::RefCell;

    /// Window as seen by a script in the fake realm.
    #[derive(Debug, PartialEq)]
    enum FakeWindow {
        Real { url: String },
        Stub { closed: bool },
    }

    /// In-memory realm: patched capabilities dispatch into the shield.
    #[derive(Default)]
    struct FakeRealm {
        origin: Option<String>,
        locked: Vec<Capability>,
        missing: Vec<Capability>,
        patched: HashMap<Capability, (Arc<Shield>, Option<&'static str>)>,
        location: RefCell<String>,
        opened: RefCell<Vec<String>>,
        posted: RefCell<Vec<Message>>,
    }

    impl FakeRealm {
        fn same_origin(url: &str) -> Self {
            Self {
                origin: Some("https://app.example".into()),
                location: RefCell::new(url.into()),
                ..Self::default()
            }
        }

        fn action(&self, cap: Capability, call: &Call<'_>) -> Action {
            match self.patched.get(&cap) {
                Some((shield, _)) => shield.intercept(cap, call),
                None => Action::Forward,
            }
        }

        fn window_open(&self, url: &str) -> FakeWindow {
            match self.action(Capability::WindowOpen, &Call::Open { url: Some(url) }) {
                Action::Forward => {
                    self.opened.borrow_mut().push(url.to_string());
                    FakeWindow::Real { url: url.to_string() }
                }
                Action::Value(StubValue::Stub(StubKind::ClosedWindow)) => FakeWindow::Stub { closed: true },
                other => panic!("unexpected {other:?}"),
            }
        }

        fn assign(&self, url: &str) {
            if self.action(Capability::LocationAssign, &Call::Navigate { target: url }) == Action::Forward {
                *self.location.borrow_mut() = url.to_string();
            }
        }
    }

    impl RealmBinding for FakeRealm {
        type Original = &'static str;

        fn origin(&self) -> Option<String> {
            self.origin.clone()
        }

        fn capture(&mut self, capability: Capability) -> Option<&'static str> {
            (!self.missing.contains(&capability)).then_some("native")
        }

        fn patch(
            &mut self,
            capability: Capability,
            shield: &Arc<Shield>,
            original: Option<&&'static str>,
        ) -> Result<(), PatchError> {
            if self.missing.contains(&capability) {
                return Err(PatchError::Missing(capability));
            }
            if self.locked.contains(&capability) {
                return Err(PatchError::Locked(capability));
            }
            self.patched.insert(capability, (Arc::clone(shield), original.copied()));
            Ok(())
        }

        fn post_to_parent(&self, message: &Message) {
            self.posted.borrow_mut().push(message.clone());
        }
    }

    fn shield(sink: &Arc<RecordingSink>) -> Arc<Shield> {
        Arc::new(
            Shield::for_document(
                "https://app.example/frame",
                &RuleTables::builtin(),
                &EngineConfig::for_origin("https://app.example"),
                Telemetry::new(sink.clone(), DEFAULT_DETAIL_CHARS),
            )
            .unwrap(),
        )
    }

    #[test]
    fn window_open_after_install_opens_nothing() {
        let sink = Arc::new(RecordingSink::new());
        let mut realm = FakeRealm::same_origin("https://app.example/frame");
        let outcome = install(&mut realm, &shield(&sink));

        let installation = outcome.installation().unwrap();
        assert_eq!(installation.installed, CapabilitySet::EVERYTHING);
        assert!(installation.gaps.is_empty());

        assert_eq!(realm.window_open("https://x.com"), FakeWindow::Stub { closed: true });
        assert!(realm.opened.borrow().is_empty());
        assert_eq!(*realm.location.borrow(), "https://app.example/frame");
        assert_eq!(realm.posted.borrow().as_slice(), &[Message::RwShieldReady]);
    }

    #[test]
    fn unshielded_realm_opens_windows() {
        let realm = FakeRealm::same_origin("https://app.example/frame");
        assert_eq!(
            realm.window_open("https://x.com"),
            FakeWindow::Real { url: "https://x.com".into() }
        );
    }

    #[test]
    fn location_assign_is_origin_locked() {
        let sink = Arc::new(RecordingSink::new());
        let mut realm = FakeRealm::same_origin("https://app.example/frame");
        install(&mut realm, &shield(&sink));

        realm.assign("https://ad.example/landing");
        assert_eq!(*realm.location.borrow(), "https://app.example/frame");
        realm.assign("/title/603");
        assert_eq!(*realm.location.borrow(), "/title/603");
    }

    #[test]
    fn cross_origin_realm_is_a_gap() {
        let sink = Arc::new(RecordingSink::new());
        let mut realm = FakeRealm::default();
        let outcome = install(&mut realm, &shield(&sink));

        assert!(matches!(outcome, InstallOutcome::CrossOrigin));
        assert!(realm.patched.is_empty());
        assert!(realm.posted.borrow().is_empty());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].category, BlockCategory::HardeningGap);
    }

    #[test]
    fn locked_and_missing_apis_become_gaps() {
        let sink = Arc::new(RecordingSink::new());
        let mut realm = FakeRealm {
            locked: vec![Capability::LocationAssign, Capability::LocationReplace],
            missing: vec![Capability::Geolocation],
            ..FakeRealm::same_origin("https://app.example/")
        };
        let outcome = install(&mut realm, &shield(&sink));
        let installation = outcome.installation().unwrap();

        assert!(installation.gaps.has(Capability::LocationAssign));
        assert!(installation.gaps.has(Capability::Geolocation));
        assert!(installation.installed.has(Capability::WindowOpen));
        assert!(!installation.originals.contains_key(&Capability::Geolocation));
        assert_eq!(installation.originals.get(&Capability::Eval), Some(&"native"));
        // Gaps in a reachable realm are logged, not reported.
        assert!(sink.is_empty());
    }
}
