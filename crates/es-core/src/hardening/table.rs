//! Capability interception table
//!
//! Maps each capability to the wrapper composed over its original
//! implementation. The default table routes every capability to its policy
//! hook; entries can be replaced or removed before installation.

use std::collections::BTreeMap;
use std::sync::Arc;

use super::capability::{Capability, CapabilitySet};
use super::frame_stub::StubValue;
use super::policy::{Action, Call, ShieldPolicy};

/// Wrapper body: given the policy and the call, decide what happens.
pub type Interceptor = Arc<dyn Fn(&ShieldPolicy, &Call<'_>) -> Action + Send + Sync>;

#[derive(Clone, Default)]
pub struct InterceptionTable {
    entries: BTreeMap<Capability, Interceptor>,
}

impl InterceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table routing every capability in `enabled` to its policy hook.
    pub fn with_policy_hooks(enabled: CapabilitySet) -> Self {
        let mut table = Self::new();
        for cap in enabled.capabilities() {
            table.set(cap, default_interceptor(cap));
        }
        table
    }

    /// Replace the wrapper for a capability.
    pub fn set(&mut self, capability: Capability, interceptor: Interceptor) -> &mut Self {
        self.entries.insert(capability, interceptor);
        self
    }

    /// Stop intercepting a capability; the original stays in place.
    pub fn remove(&mut self, capability: Capability) -> bool {
        self.entries.remove(&capability).is_some()
    }

    pub fn get(&self, capability: Capability) -> Option<&Interceptor> {
        self.entries.get(&capability)
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for InterceptionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}

/// Box a closure as an interceptor.
pub fn hook<F>(f: F) -> Interceptor
where
    F: Fn(&ShieldPolicy, &Call<'_>) -> Action + Send + Sync + 'static,
{
    Arc::new(f)
}

fn default_interceptor(cap: Capability) -> Interceptor {
    use Capability::*;

    match cap {
        WindowOpen => hook(|p, c| p.popup(c)),
        Opener => hook(|p, c| p.pinned(c, StubValue::Null)),
        WindowName => hook(|p, c| p.pinned(c, StubValue::Str(""))),
        LocationHref | LocationAssign | LocationReplace | LocationReload => hook(|p, c| p.navigation(c)),
        Top | Parent => hook(|p, c| p.ancestor(c)),
        Eval | FunctionCtor | SetTimeout | SetInterval => hook(|p, c| p.dynamic_code(c)),
        Fetch | XhrOpen | XhrSend | WebSocket | SendBeacon | ImgSrc | ScriptSrc | IframeSrc => {
            hook(|p, c| p.traffic(c))
        }
        DomObserver | DomSweep => hook(|p, c| p.element(c)),
        NotificationPermission => hook(|p, _| p.ambient("Notification.requestPermission", true)),
        Geolocation => hook(|p, _| p.ambient("navigator.geolocation", false)),
        ServiceWorkerRegister => hook(|p, _| p.ambient("navigator.serviceWorker.register", true)),
        PostMessage => hook(|p, c| p.message(c)),
        HistoryPushState | HistoryReplaceState => hook(|p, _| p.history()),
        AnchorClick => hook(|p, c| p.anchor_click(c)),
        BeforeUnload => hook(|p, _| p.before_unload()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_enabled_set() {
        let table = InterceptionTable::with_policy_hooks(CapabilitySet::EVERYTHING);
        assert_eq!(table.len(), Capability::ALL.len());
        assert_eq!(table.capabilities(), CapabilitySet::EVERYTHING);

        let popups = InterceptionTable::with_policy_hooks(CapabilitySet::POPUP);
        assert_eq!(popups.len(), 3);
        assert!(popups.get(Capability::Eval).is_none());
    }

    #[test]
    fn entries_can_be_replaced_and_removed() {
        let mut table = InterceptionTable::with_policy_hooks(CapabilitySet::EVERYTHING);
        table.set(Capability::Eval, hook(|_, _| Action::Forward));
        assert!(table.remove(Capability::Geolocation));
        assert!(!table.remove(Capability::Geolocation));
        assert!(!table.capabilities().has(Capability::Geolocation));
    }
}
