//! Shield policy
//!
//! The decisions behind every wrapped API. A binding translates a script's
//! call into a `Call`, asks the shield, and carries out the `Action`. Dropped
//! calls return quietly; embed code that never expected an exception keeps
//! running.

use std::sync::Arc;

use crate::classifier::DomainClassifier;
use crate::config::OverlayConfig;
use crate::telemetry::Telemetry;
use crate::types::BlockCategory;
use crate::url::{normalize_host, resolve};

use super::dom::{ElementInfo, Removal};
use super::frame_stub::{is_navigating_write, StubKind, StubValue, ANCESTOR, CLOSED_WINDOW};
use super::state::ShieldState;

/// A script-level call, reduced to what the policy needs.
#[derive(Debug, Clone, PartialEq)]
pub enum Call<'a> {
    /// `window.open(url)`
    Open { url: Option<&'a str> },
    /// Property read of a pinned or spoofed property
    Read,
    /// Property write of a pinned property
    Write,
    /// Navigation of this document
    Navigate { target: &'a str },
    /// `location.reload()`
    Reload,
    /// `eval`/`Function` body. `None` for non-string arguments.
    Code { source: Option<&'a str> },
    /// String-form timer body. `None` for function handlers.
    Timer { source: Option<&'a str> },
    /// Network traffic started from script
    Request { url: &'a str },
    /// Cross-frame message payload, as text
    Message { payload: &'a str },
    /// Programmatic `click()` on an anchor
    AnchorClick { href: &'a str, target: &'a str },
    /// Permission prompt, geolocation or worker registration
    Ambient,
    /// `history.pushState/replaceState`
    History,
    /// `beforeunload` event
    BeforeUnload,
    /// Inserted or swept element
    Element(&'a ElementInfo),
}

/// What the binding does with the call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Call the original implementation.
    Forward,
    /// Skip the call and return `undefined`.
    Drop,
    /// Skip the call and return this value.
    Value(StubValue),
    /// Resolve with `"denied"` (or reject, for APIs without that value).
    Deny,
    /// Detach the element.
    Remove(Removal),
}

/// Policy object injected into a realm binding.
pub struct ShieldPolicy {
    state: ShieldState,
    classifier: Arc<DomainClassifier>,
    overlay: OverlayConfig,
    telemetry: Telemetry,
}

impl ShieldPolicy {
    pub fn new(
        state: ShieldState,
        classifier: Arc<DomainClassifier>,
        overlay: OverlayConfig,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            state,
            classifier,
            overlay,
            telemetry,
        }
    }

    pub fn state(&self) -> &ShieldState {
        &self.state
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Suppress a popup and hand back a closed window.
    pub fn popup(&self, call: &Call<'_>) -> Action {
        if let Call::Open { url } = call {
            self.telemetry.report(BlockCategory::Popup, url.unwrap_or("window.open"));
        }
        Action::Value(CLOSED_WINDOW)
    }

    /// `opener` reads as null, `name` as empty; writes vanish.
    pub fn pinned(&self, call: &Call<'_>, value: StubValue) -> Action {
        match call {
            Call::Read => Action::Value(value),
            _ => Action::Drop,
        }
    }

    /// `top`/`parent` read as the ancestor stub.
    pub fn ancestor(&self, call: &Call<'_>) -> Action {
        match call {
            Call::Read => Action::Value(ANCESTOR),
            _ => Action::Forward,
        }
    }

    /// Same-origin navigations proceed; everything else is dropped.
    pub fn navigation(&self, call: &Call<'_>) -> Action {
        match call {
            Call::Navigate { target } if self.state.is_same_origin(target) => Action::Forward,
            Call::Navigate { target } => {
                self.telemetry.report(BlockCategory::Location, target);
                Action::Drop
            }
            _ => Action::Forward,
        }
    }

    /// Writes on a stub window or location are swallowed. Those that would
    /// have navigated a real window are reported like a blocked navigation.
    pub fn stub_write(&self, kind: StubKind, property: &str, value: Option<&str>) -> Action {
        if is_navigating_write(kind, property) {
            let detail = value.filter(|v| !v.is_empty()).unwrap_or(property);
            self.telemetry.report(BlockCategory::Location, detail);
        }
        Action::Drop
    }

    /// String payloads carrying a code keyword are dropped.
    pub fn dynamic_code(&self, call: &Call<'_>) -> Action {
        let (source, category) = match call {
            Call::Code { source } => (*source, BlockCategory::DynamicCode),
            Call::Timer { source } => (*source, BlockCategory::Timer),
            _ => return Action::Forward,
        };
        match source.and_then(|s| self.state.code_keywords().find(s)) {
            Some(keyword) => {
                self.telemetry.report(category, keyword);
                Action::Drop
            }
            None => Action::Forward,
        }
    }

    /// Traffic to a blocked host never leaves the page.
    pub fn traffic(&self, call: &Call<'_>) -> Action {
        let Call::Request { url } = call else {
            return Action::Forward;
        };
        match self.blocked_host(url) {
            Some(host) => {
                self.telemetry.report(BlockCategory::Resource, &host);
                Action::Drop
            }
            None => Action::Forward,
        }
    }

    /// Messages carrying a redirect or popup keyword are swallowed.
    pub fn message(&self, call: &Call<'_>) -> Action {
        let Call::Message { payload } = call else {
            return Action::Forward;
        };
        match self.state.message_keywords().find(payload) {
            Some(keyword) => {
                self.telemetry.report(BlockCategory::Message, keyword);
                Action::Drop
            }
            None => Action::Forward,
        }
    }

    /// Programmatic clicks that would open a new context or leave the origin.
    pub fn anchor_click(&self, call: &Call<'_>) -> Action {
        let Call::AnchorClick { href, target } = call else {
            return Action::Forward;
        };
        let href = href.trim();
        let external = !href.is_empty() && !self.state.is_same_origin(href);
        if external || target.eq_ignore_ascii_case("_blank") {
            self.telemetry.report(BlockCategory::Popup, if href.is_empty() { "_blank" } else { href });
            return Action::Drop;
        }
        Action::Forward
    }

    /// Permission prompts and worker registration are refused.
    pub fn ambient(&self, name: &str, deny: bool) -> Action {
        self.telemetry.report(BlockCategory::Permission, name);
        if deny {
            Action::Deny
        } else {
            Action::Drop
        }
    }

    /// History entries cannot be forged from an embedded document.
    pub fn history(&self) -> Action {
        log::debug!("dropped history mutation in {}", self.state.document_url());
        Action::Drop
    }

    /// Unload-time redirects are cancelled.
    pub fn before_unload(&self) -> Action {
        Action::Drop
    }

    /// Remove elements with a blocked source and ad overlays.
    pub fn element(&self, call: &Call<'_>) -> Action {
        let Call::Element(info) = call else {
            return Action::Forward;
        };
        if info.has_source() {
            if let Some(host) = info.src.as_deref().and_then(|src| self.blocked_host(src)) {
                self.telemetry.report(BlockCategory::Dom, &host);
                return Action::Remove(Removal::BlockedSource);
            }
        }
        if info.is_overlay(&self.overlay) {
            self.telemetry.report(BlockCategory::Dom, &info.tag);
            return Action::Remove(Removal::Overlay);
        }
        Action::Forward
    }

    /// Host of `url` (resolved against the document) if it is blocked.
    fn blocked_host(&self, url: &str) -> Option<String> {
        let resolved = resolve(self.state.document_url(), url)?;
        let host = normalize_host(resolved.host_str()?);
        if self.classifier.blocked_by(&host).is_some() {
            Some(host)
        } else {
            None
        }
    }
}
