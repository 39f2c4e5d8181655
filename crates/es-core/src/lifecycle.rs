//! Service lifecycle
//!
//! install -> waiting -> active. The interception layer activates as soon as
//! it is installed unless configured otherwise, then claims every open
//! document so there is no grace period. A waiting layer can be forced
//! active with `SKIP_WAITING`.
//!
//! Lifecycle handlers return effects instead of performing them; the host
//! binding carries them out.

use std::sync::atomic::{AtomicU8, Ordering};

use serde_json::Value;

use crate::messages::Message;

/// Version reported by `GET_VERSION` and `SW_ACTIVATED`.
pub const SW_VERSION: &str = "rw-shield-5";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Parsed,
    Installing,
    Waiting,
    Active,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Installing,
            2 => Self::Waiting,
            3 => Self::Active,
            _ => Self::Parsed,
        }
    }
}

/// Action the host must take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Answer the sender of the current message.
    Reply(Message),
    /// Post to every open document.
    Broadcast(Message),
    /// Ask the host to promote this worker without waiting.
    SkipWaiting,
    /// Take control of already-open documents.
    ClaimClients,
}

#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    immediate: bool,
}

impl Lifecycle {
    pub fn new(immediate_activation: bool) -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::Parsed as u8),
            immediate: immediate_activation,
        }
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == LifecycleState::Active
    }

    fn set(&self, state: LifecycleState) {
        log::info!("lifecycle: {:?} -> {:?}", self.state(), state);
        self.state.store(state as u8, Ordering::Release);
    }

    /// Install event. The worker is waiting once this returns.
    pub fn on_install(&self) -> Vec<Effect> {
        self.set(LifecycleState::Installing);
        self.set(LifecycleState::Waiting);
        if self.immediate {
            vec![Effect::SkipWaiting]
        } else {
            Vec::new()
        }
    }

    /// Activate event.
    pub fn on_activate(&self) -> Vec<Effect> {
        self.set(LifecycleState::Active);
        vec![
            Effect::ClaimClients,
            Effect::Broadcast(Message::SwActivated {
                version: SW_VERSION.to_string(),
            }),
        ]
    }

    /// Message from a document.
    pub fn on_message(&self, payload: &Value) -> Vec<Effect> {
        self.dispatch(Message::decode(payload))
    }

    pub fn dispatch(&self, message: Message) -> Vec<Effect> {
        match message {
            Message::Ping => vec![Effect::Reply(Message::Pong)],
            Message::GetVersion => vec![Effect::Reply(Message::Version {
                version: SW_VERSION.to_string(),
            })],
            Message::SkipWaiting if self.state() == LifecycleState::Waiting => vec![Effect::SkipWaiting],
            Message::Unrecognized => {
                log::debug!("ignoring unrecognized message");
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn immediate_activation() {
        let lc = Lifecycle::new(true);
        assert_eq!(lc.on_install(), vec![Effect::SkipWaiting]);
        assert_eq!(lc.state(), LifecycleState::Waiting);

        let effects = lc.on_activate();
        assert!(lc.is_active());
        assert_eq!(effects[0], Effect::ClaimClients);
        assert_eq!(
            effects[1],
            Effect::Broadcast(Message::SwActivated { version: SW_VERSION.to_string() })
        );
    }

    #[test]
    fn deferred_activation_waits_for_skip_waiting() {
        let lc = Lifecycle::new(false);
        assert!(lc.on_install().is_empty());
        assert_eq!(lc.on_message(&json!({"type": "SKIP_WAITING"})), vec![Effect::SkipWaiting]);
        lc.on_activate();
        // Already active: nothing to skip.
        assert!(lc.on_message(&json!({"type": "SKIP_WAITING"})).is_empty());
    }

    #[test]
    fn health_checks() {
        let lc = Lifecycle::default();
        assert_eq!(lc.on_message(&json!("PING")), vec![Effect::Reply(Message::Pong)]);
        assert_eq!(
            lc.on_message(&json!({"type": "GET_VERSION"})),
            vec![Effect::Reply(Message::Version { version: "rw-shield-5".to_string() })]
        );
        assert!(lc.on_message(&json!({"type": "NAVIGATE"})).is_empty());
        assert!(lc.on_message(&json!({"type": "PONG"})).is_empty());
    }
}
