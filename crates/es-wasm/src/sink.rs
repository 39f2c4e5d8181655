//! Telemetry delivery from inside the browser.

use std::cell::RefCell;

use es_core::messages::Message;
use es_core::telemetry::{TelemetryEvent, TelemetrySink};
use js_sys::{Array, Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

thread_local! {
    /// Real parent window of a shielded document, captured before
    /// `window.parent` is spoofed.
    static PARENT: RefCell<Option<JsValue>> = const { RefCell::new(None) };
}

pub fn set_parent(parent: JsValue) {
    PARENT.with(|p| *p.borrow_mut() = Some(parent));
}

/// Where events go after the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Every client of the worker
    Clients,
    /// The parent document
    Parent,
}

/// Logs each block to the console and posts it as `RW_BLOCKED`. Delivery is
/// best effort: nothing here can fail the request being blocked.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    delivery: Delivery,
}

impl ConsoleSink {
    pub fn new(delivery: Delivery) -> Self {
        Self { delivery }
    }
}

impl TelemetrySink for ConsoleSink {
    fn report(&self, event: TelemetryEvent) {
        web_sys::console::info_1(&format!("[shield] blocked {} {}", event.category.as_str(), event.hostname).into());

        let message = message_to_js(&Message::RwBlocked(event));
        match self.delivery {
            Delivery::Clients => broadcast(&message),
            Delivery::Parent => PARENT.with(|parent| {
                if let Some(parent) = parent.borrow().as_ref() {
                    post_message(parent, &message);
                }
            }),
        }
    }
}

/// Encode a protocol message as a plain JavaScript object.
pub fn message_to_js(message: &Message) -> JsValue {
    message
        .encode()
        .and_then(|value| js_sys::JSON::parse(&value.to_string()).ok())
        .unwrap_or(JsValue::UNDEFINED)
}

pub fn post_message(target: &JsValue, message: &JsValue) {
    let post = Reflect::get(target, &"postMessage".into()).and_then(|f| f.dyn_into::<Function>());
    if let Ok(post) = post {
        let _ = post.call2(target, message, &"*".into());
    }
}

/// `clients.matchAll({includeUncontrolled: true})` then post to each.
pub fn broadcast(message: &JsValue) {
    let global = js_sys::global();
    let Ok(clients) = Reflect::get(&global, &"clients".into()) else {
        return;
    };
    let Ok(match_all) = Reflect::get(&clients, &"matchAll".into()).and_then(|f| f.dyn_into::<Function>())
    else {
        return;
    };

    let options = Object::new();
    let _ = Reflect::set(&options, &"includeUncontrolled".into(), &JsValue::TRUE);
    let Ok(pending) = match_all.call1(&clients, &options) else {
        return;
    };
    let Ok(pending) = pending.dyn_into::<js_sys::Promise>() else {
        return;
    };

    let message = message.clone();
    let deliver: Closure<dyn FnMut(JsValue)> = Closure::once(move |list: JsValue| {
        for client in Array::from(&list).iter() {
            let _ = Reflect::get(&client, &"postMessage".into())
                .and_then(|f| f.dyn_into::<Function>())
                .and_then(|post| post.call1(&client, &message));
        }
    });
    let _ = pending.then(&deliver);
    deliver.forget();
}
