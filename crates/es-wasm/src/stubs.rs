//! JavaScript stand-ins for windows, locations and sockets.

use std::cell::RefCell;
use std::sync::Arc;

use es_core::hardening::{read_stub, Shield, StubKind, StubValue};
use js_sys::{Function, Object, Proxy, Reflect};
use wasm_bindgen::prelude::*;

thread_local! {
    // Ancestor, ClosedWindow, Location
    static STUBS: RefCell<[Option<JsValue>; 3]> = const { RefCell::new([None, None, None]) };
    /// Shield that judges writes on the stubs.
    static SHIELD: RefCell<Option<Arc<Shield>>> = const { RefCell::new(None) };
}

pub fn attach(shield: &Arc<Shield>) {
    SHIELD.with(|current| *current.borrow_mut() = Some(Arc::clone(shield)));
}

fn slot(kind: StubKind) -> usize {
    match kind {
        StubKind::Ancestor => 0,
        StubKind::ClosedWindow => 1,
        StubKind::Location => 2,
    }
}

/// Convert a stub answer into a JavaScript value.
pub fn to_js(value: StubValue) -> JsValue {
    match value {
        StubValue::Stub(kind) => stub_object(kind),
        StubValue::Noop => Function::new_no_args("").into(),
        StubValue::OpenStub => {
            let open = Closure::wrap(Box::new(|| stub_object(StubKind::ClosedWindow)) as Box<dyn FnMut() -> JsValue>);
            open.into_js_value()
        }
        StubValue::Bool(b) => JsValue::from_bool(b),
        StubValue::Number(n) => JsValue::from_f64(n),
        StubValue::Str(s) => JsValue::from_str(s),
        StubValue::Null => JsValue::NULL,
        StubValue::Undefined => JsValue::UNDEFINED,
    }
}

/// The stub object for `kind`. One instance per kind, so `top.top === top`.
pub fn stub_object(kind: StubKind) -> JsValue {
    if let Some(existing) = STUBS.with(|stubs| stubs.borrow()[slot(kind)].clone()) {
        return existing;
    }

    let handler = Object::new();
    let get = Closure::wrap(Box::new(move |_target: JsValue, property: JsValue, _receiver: JsValue| -> JsValue {
        match property.as_string() {
            Some(name) => to_js(read_stub(kind, &name)),
            None => JsValue::UNDEFINED,
        }
    }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> JsValue>);
    let set = Closure::wrap(Box::new(move |_target: JsValue, property: JsValue, value: JsValue| -> bool {
        if let Some(name) = property.as_string() {
            let text = value.as_string();
            SHIELD.with(|shield| match shield.borrow().as_ref() {
                Some(shield) => {
                    shield.policy().stub_write(kind, &name, text.as_deref());
                }
                None => log::debug!("swallowed {name} write on {kind:?} stub: {text:?}"),
            });
        }
        true
    }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> bool>);

    let _ = Reflect::set(&handler, &"get".into(), get.as_ref());
    let _ = Reflect::set(&handler, &"set".into(), set.as_ref());
    get.forget();
    set.forget();

    let stub: JsValue = Proxy::new(&Object::new(), &handler).into();
    STUBS.with(|stubs| stubs.borrow_mut()[slot(kind)] = Some(stub.clone()));
    stub
}

/// A WebSocket that was never opened.
pub fn closed_socket() -> JsValue {
    let socket = Object::new();
    let _ = Reflect::set(&socket, &"readyState".into(), &JsValue::from_f64(3.0));
    for method in ["send", "close", "addEventListener", "removeEventListener"] {
        let _ = Reflect::set(&socket, &method.into(), &Function::new_no_args(""));
    }
    socket.into()
}
