//! Capabilities the hardening layer intercepts.

use std::fmt;

/// A JavaScript API able to navigate, open a window, run code or send
/// traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    // Popups
    WindowOpen,
    Opener,
    WindowName,
    // Navigation
    LocationHref,
    LocationAssign,
    LocationReplace,
    LocationReload,
    // Ancestor frames
    Top,
    Parent,
    // Dynamic code
    Eval,
    FunctionCtor,
    SetTimeout,
    SetInterval,
    // Traffic
    Fetch,
    XhrOpen,
    XhrSend,
    WebSocket,
    SendBeacon,
    ImgSrc,
    ScriptSrc,
    IframeSrc,
    // DOM
    DomObserver,
    DomSweep,
    // Ambient
    NotificationPermission,
    Geolocation,
    ServiceWorkerRegister,
    // Misc abuse channels
    PostMessage,
    HistoryPushState,
    HistoryReplaceState,
    AnchorClick,
    BeforeUnload,
}

impl Capability {
    /// Every capability, in installation order.
    pub const ALL: [Capability; 31] = [
        Self::WindowOpen,
        Self::Opener,
        Self::WindowName,
        Self::LocationHref,
        Self::LocationAssign,
        Self::LocationReplace,
        Self::LocationReload,
        Self::Top,
        Self::Parent,
        Self::Eval,
        Self::FunctionCtor,
        Self::SetTimeout,
        Self::SetInterval,
        Self::Fetch,
        Self::XhrOpen,
        Self::XhrSend,
        Self::WebSocket,
        Self::SendBeacon,
        Self::ImgSrc,
        Self::ScriptSrc,
        Self::IframeSrc,
        Self::DomObserver,
        Self::DomSweep,
        Self::NotificationPermission,
        Self::Geolocation,
        Self::ServiceWorkerRegister,
        Self::PostMessage,
        Self::HistoryPushState,
        Self::HistoryReplaceState,
        Self::AnchorClick,
        Self::BeforeUnload,
    ];

    /// Name of the API as scripts see it.
    pub fn name(self) -> &'static str {
        match self {
            Self::WindowOpen => "open",
            Self::Opener => "opener",
            Self::WindowName => "name",
            Self::LocationHref => "location.href",
            Self::LocationAssign => "location.assign",
            Self::LocationReplace => "location.replace",
            Self::LocationReload => "location.reload",
            Self::Top => "top",
            Self::Parent => "parent",
            Self::Eval => "eval",
            Self::FunctionCtor => "Function",
            Self::SetTimeout => "setTimeout",
            Self::SetInterval => "setInterval",
            Self::Fetch => "fetch",
            Self::XhrOpen => "XMLHttpRequest.open",
            Self::XhrSend => "XMLHttpRequest.send",
            Self::WebSocket => "WebSocket",
            Self::SendBeacon => "navigator.sendBeacon",
            Self::ImgSrc => "HTMLImageElement.src",
            Self::ScriptSrc => "HTMLScriptElement.src",
            Self::IframeSrc => "HTMLIFrameElement.src",
            Self::DomObserver => "MutationObserver",
            Self::DomSweep => "sweep",
            Self::NotificationPermission => "Notification.requestPermission",
            Self::Geolocation => "navigator.geolocation",
            Self::ServiceWorkerRegister => "navigator.serviceWorker.register",
            Self::PostMessage => "message",
            Self::HistoryPushState => "history.pushState",
            Self::HistoryReplaceState => "history.replaceState",
            Self::AnchorClick => "HTMLAnchorElement.click",
            Self::BeforeUnload => "beforeunload",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cap| cap.name() == name)
    }

    #[inline]
    pub const fn bit(self) -> u64 {
        1 << (self as u64)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags::bitflags! {
    /// Set of capabilities, one bit per `Capability`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CapabilitySet: u64 {
        const POPUP = Capability::WindowOpen.bit() | Capability::Opener.bit() | Capability::WindowName.bit();
        const NAVIGATION = Capability::LocationHref.bit()
            | Capability::LocationAssign.bit()
            | Capability::LocationReplace.bit()
            | Capability::LocationReload.bit();
        const ANCESTORS = Capability::Top.bit() | Capability::Parent.bit();
        const DYNAMIC_CODE = Capability::Eval.bit() | Capability::FunctionCtor.bit();
        const TIMERS = Capability::SetTimeout.bit() | Capability::SetInterval.bit();
        const TRAFFIC = Capability::Fetch.bit()
            | Capability::XhrOpen.bit()
            | Capability::XhrSend.bit()
            | Capability::WebSocket.bit()
            | Capability::SendBeacon.bit()
            | Capability::ImgSrc.bit()
            | Capability::ScriptSrc.bit()
            | Capability::IframeSrc.bit();
        const DOM = Capability::DomObserver.bit() | Capability::DomSweep.bit();
        const AMBIENT = Capability::NotificationPermission.bit()
            | Capability::Geolocation.bit()
            | Capability::ServiceWorkerRegister.bit();
        const ABUSE = Capability::PostMessage.bit()
            | Capability::HistoryPushState.bit()
            | Capability::HistoryReplaceState.bit()
            | Capability::AnchorClick.bit()
            | Capability::BeforeUnload.bit();

        const EVERYTHING = Self::POPUP.bits()
            | Self::NAVIGATION.bits()
            | Self::ANCESTORS.bits()
            | Self::DYNAMIC_CODE.bits()
            | Self::TIMERS.bits()
            | Self::TRAFFIC.bits()
            | Self::DOM.bits()
            | Self::AMBIENT.bits()
            | Self::ABUSE.bits();
    }
}

impl CapabilitySet {
    pub fn of(capability: Capability) -> Self {
        Self::from_bits_truncate(capability.bit())
    }

    pub fn add(&mut self, capability: Capability) {
        self.insert(Self::of(capability));
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.contains(Self::of(capability))
    }

    /// Member capabilities in installation order.
    pub fn capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(move |cap| self.has(*cap))
    }

    /// Comma-separated API names, for logs.
    pub fn names(&self) -> String {
        self.capabilities().map(Capability::name).collect::<Vec<_>>().join(", ")
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        let mut set = Self::empty();
        for cap in iter {
            set.add(cap);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_cover_every_capability() {
        assert_eq!(CapabilitySet::EVERYTHING.capabilities().count(), Capability::ALL.len());
        for cap in Capability::ALL {
            assert!(CapabilitySet::EVERYTHING.has(cap), "{cap}");
        }
    }

    #[test]
    fn names_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(Capability::from_name(cap.name()), Some(cap));
        }
        assert_eq!(Capability::from_name("document.write"), None);
    }

    #[test]
    fn set_operations() {
        let set: CapabilitySet = [Capability::Eval, Capability::WindowOpen].into_iter().collect();
        assert!(set.has(Capability::Eval));
        assert!(!set.has(Capability::Fetch));
        assert_eq!(set.names(), "open, eval");
    }
}
