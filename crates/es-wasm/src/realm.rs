//! Binding the hardening policy onto a live window.
//!
//! Methods are replaced by proxies whose `apply` trap asks the shield and
//! falls through to the captured original on `Forward`. Accessors get a
//! getter/setter pair routed the same way. The message and unload channels,
//! the DOM observer and the sweep are installed as listeners and timers.
//!
//! Properties the browser marks unforgeable (`location.*`, `top`) cannot be
//! redefined. Those surface as gaps and stay covered by the mediator.

use std::sync::Arc;

use es_core::hardening::{
    Action, Call, Capability, ElementInfo, PatchError, Position, RealmBinding, Shield,
};
use es_core::messages::Message;
use js_sys::{Array, Function, Object, Promise, Proxy, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;

use crate::sink::{message_to_js, post_message, set_parent};
use crate::stubs;

type Trap = Closure<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>;
type Hook = Closure<dyn FnMut(JsValue, JsValue) -> Result<JsValue, JsValue>>;

const XHR_URL_KEY: &str = "__shieldUrl";

const SWEEP_SELECTOR: &str = "iframe,frame,script,img,embed,object,a[href],div,section,aside,ins";

/// How a capability is reached in the realm.
enum Slot {
    Method,
    Constructor,
    Accessor,
    /// Several methods on the object at the property
    Methods(&'static [&'static str]),
    Listener(&'static str),
    Observer,
    Sweep,
}

fn slot(cap: Capability) -> Slot {
    use Capability::*;

    match cap {
        Opener | WindowName | LocationHref | Top | Parent | ImgSrc | ScriptSrc | IframeSrc => Slot::Accessor,
        FunctionCtor | WebSocket => Slot::Constructor,
        Geolocation => Slot::Methods(&["getCurrentPosition", "watchPosition"]),
        PostMessage => Slot::Listener("message"),
        BeforeUnload => Slot::Listener("beforeunload"),
        DomObserver => Slot::Observer,
        DomSweep => Slot::Sweep,
        _ => Slot::Method,
    }
}

/// Capabilities whose replacement must survive later redefinition by page
/// script.
fn pinned(cap: Capability) -> bool {
    use Capability::*;

    matches!(cap, WindowOpen | Opener | WindowName | Top | Parent)
}

/// A window reachable from this script.
pub struct JsRealm {
    window: JsValue,
    parent: JsValue,
}

impl JsRealm {
    pub fn new(window: JsValue) -> Self {
        let parent = Reflect::get(&window, &"parent".into()).unwrap_or(JsValue::NULL);
        set_parent(parent.clone());
        Self { window, parent }
    }

    /// Object owning the capability, and the property name on it.
    fn owner(&self, cap: Capability) -> Option<(JsValue, &'static str)> {
        use Capability::*;

        let at = |path: &[&str]| -> Option<JsValue> {
            let mut current = self.window.clone();
            for key in path {
                current = Reflect::get(&current, &JsValue::from_str(key)).ok()?;
                if current.is_undefined() || current.is_null() {
                    return None;
                }
            }
            Some(current)
        };

        let (path, property): (&[&str], &'static str) = match cap {
            WindowOpen => (&[], "open"),
            Opener => (&[], "opener"),
            WindowName => (&[], "name"),
            LocationHref => (&["location"], "href"),
            LocationAssign => (&["location"], "assign"),
            LocationReplace => (&["location"], "replace"),
            LocationReload => (&["location"], "reload"),
            Top => (&[], "top"),
            Parent => (&[], "parent"),
            Eval => (&[], "eval"),
            FunctionCtor => (&[], "Function"),
            SetTimeout => (&[], "setTimeout"),
            SetInterval => (&[], "setInterval"),
            Fetch => (&[], "fetch"),
            XhrOpen => (&["XMLHttpRequest", "prototype"], "open"),
            XhrSend => (&["XMLHttpRequest", "prototype"], "send"),
            WebSocket => (&[], "WebSocket"),
            SendBeacon => (&["navigator"], "sendBeacon"),
            ImgSrc => (&["HTMLImageElement", "prototype"], "src"),
            ScriptSrc => (&["HTMLScriptElement", "prototype"], "src"),
            IframeSrc => (&["HTMLIFrameElement", "prototype"], "src"),
            DomObserver => (&[], "MutationObserver"),
            DomSweep => (&[], "setTimeout"),
            NotificationPermission => (&["Notification"], "requestPermission"),
            Geolocation => (&["navigator"], "geolocation"),
            ServiceWorkerRegister => (&["navigator", "serviceWorker"], "register"),
            PostMessage | BeforeUnload => (&[], "addEventListener"),
            HistoryPushState => (&["history"], "pushState"),
            HistoryReplaceState => (&["history"], "replaceState"),
            AnchorClick => (&["HTMLAnchorElement", "prototype"], "click"),
        };
        Some((at(path)?, property))
    }
}

impl RealmBinding for JsRealm {
    type Original = JsValue;

    fn origin(&self) -> Option<String> {
        // Throws for a cross-origin window.
        let location = Reflect::get(&self.window, &"location".into()).ok()?;
        let origin = Reflect::get(&location, &"origin".into()).ok()?.as_string()?;
        (origin != "null").then_some(origin)
    }

    fn capture(&mut self, cap: Capability) -> Option<JsValue> {
        let (owner, property) = self.owner(cap)?;
        let original = match slot(cap) {
            Slot::Accessor => find_descriptor(&owner, property),
            _ => Reflect::get(&owner, &property.into()).ok(),
        };
        original.filter(|value| !value.is_undefined())
    }

    fn patch(&mut self, cap: Capability, shield: &Arc<Shield>, original: Option<&JsValue>) -> Result<(), PatchError> {
        let (owner, property) = self.owner(cap).ok_or(PatchError::Missing(cap))?;
        let host_error = |e: JsValue| PatchError::Host {
            capability: cap,
            reason: format!("{e:?}"),
        };

        match slot(cap) {
            Slot::Method => {
                let original = original.ok_or(PatchError::Missing(cap))?;
                let proxy = proxy_method(cap, shield, original, false);
                define_value(&owner, property, &proxy, cap)
            }
            Slot::Constructor => {
                let original = original.ok_or(PatchError::Missing(cap))?;
                let proxy = proxy_method(cap, shield, original, true);
                define_value(&owner, property, &proxy, cap)
            }
            Slot::Accessor => {
                let descriptor = original.ok_or(PatchError::Missing(cap))?;
                define_accessor(&owner, property, cap, shield, descriptor)
            }
            Slot::Methods(names) => {
                let target = original.ok_or(PatchError::Missing(cap))?;
                for name in names {
                    let method = Reflect::get(target, &(*name).into()).map_err(host_error)?;
                    if method.is_function() {
                        let proxy = proxy_method(cap, shield, &method, false);
                        define_value(target, name, &proxy, cap)?;
                    }
                }
                Ok(())
            }
            Slot::Listener(event) => add_listener(&self.window, event, cap, shield).map_err(host_error),
            Slot::Observer => start_observer(&self.window, cap, shield).map_err(host_error),
            Slot::Sweep => schedule_sweeps(&self.window, cap, shield).map_err(host_error),
        }
    }

    fn post_to_parent(&self, message: &Message) {
        if !self.parent.is_null() {
            post_message(&self.parent, &message_to_js(message));
        }
    }
}

// =============================================================================
// Calls
// =============================================================================

/// A `Call` with owned arguments, decoded from a JavaScript invocation.
enum OwnedCall {
    Open(Option<String>),
    Navigate(String),
    Reload,
    Code(Option<String>),
    Timer(Option<String>),
    Request(String),
    AnchorClick { href: String, target: String },
    Read,
    Write,
    Ambient,
    History,
}

impl OwnedCall {
    fn decode(cap: Capability, this: &JsValue, args: &Array) -> Self {
        use Capability::*;

        let string_arg = |i: u32| args.get(i).as_string();
        match cap {
            WindowOpen => Self::Open(string_arg(0).filter(|u| !u.is_empty())),
            LocationAssign | LocationReplace | LocationHref => Self::Navigate(string_arg(0).unwrap_or_default()),
            LocationReload => Self::Reload,
            // `new Function(a, b, body)`: the body is the last argument.
            FunctionCtor => Self::Code(args.get(args.length().saturating_sub(1)).as_string()),
            Eval => Self::Code(string_arg(0)),
            SetTimeout | SetInterval => Self::Timer(string_arg(0)),
            Fetch => Self::Request(string_arg(0).or_else(|| property_string(&args.get(0), "url")).unwrap_or_default()),
            XhrOpen => Self::Request(string_arg(1).unwrap_or_default()),
            XhrSend => Self::Request(property_string(this, XHR_URL_KEY).unwrap_or_default()),
            WebSocket | SendBeacon | ImgSrc | ScriptSrc | IframeSrc => Self::Request(string_arg(0).unwrap_or_default()),
            AnchorClick => Self::AnchorClick {
                href: attribute(this, "href").unwrap_or_default(),
                target: attribute(this, "target").unwrap_or_default(),
            },
            NotificationPermission | Geolocation | ServiceWorkerRegister => Self::Ambient,
            HistoryPushState | HistoryReplaceState => Self::History,
            _ => Self::Read,
        }
    }

    fn as_call(&self) -> Call<'_> {
        match self {
            Self::Open(url) => Call::Open { url: url.as_deref() },
            Self::Navigate(target) => Call::Navigate { target },
            Self::Reload => Call::Reload,
            Self::Code(source) => Call::Code { source: source.as_deref() },
            Self::Timer(source) => Call::Timer { source: source.as_deref() },
            Self::Request(url) => Call::Request { url },
            Self::AnchorClick { href, target } => Call::AnchorClick { href, target },
            Self::Read => Call::Read,
            Self::Write => Call::Write,
            Self::Ambient => Call::Ambient,
            Self::History => Call::History,
        }
    }
}

/// Carry out `action`, with `forward` running the original.
fn respond(
    cap: Capability,
    action: Action,
    forward: impl FnOnce() -> Result<JsValue, JsValue>,
) -> Result<JsValue, JsValue> {
    match action {
        Action::Forward => forward(),
        Action::Drop => Ok(dropped(cap)),
        Action::Value(value) => Ok(stubs::to_js(value)),
        Action::Deny => Ok(denied(cap)),
        Action::Remove(_) => Ok(JsValue::UNDEFINED),
    }
}

/// Return value of a dropped call. Callers that expect a promise or an
/// object get one.
fn dropped(cap: Capability) -> JsValue {
    match cap {
        Capability::SendBeacon => JsValue::TRUE,
        Capability::Fetch => Promise::reject(&js_sys::TypeError::new("Failed to fetch")).into(),
        Capability::WebSocket => stubs::closed_socket(),
        _ => JsValue::UNDEFINED,
    }
}

fn denied(cap: Capability) -> JsValue {
    match cap {
        Capability::NotificationPermission => Promise::resolve::<JsValue>(&"denied".into()).into(),
        _ => Promise::reject(&js_sys::Error::new("denied")).into(),
    }
}

// =============================================================================
// Methods and constructors
// =============================================================================

fn proxy_method(cap: Capability, shield: &Arc<Shield>, original: &JsValue, construct: bool) -> JsValue {
    let handler = Object::new();

    let apply: Trap = {
        let shield = Arc::clone(shield);
        let original: Function = original.clone().unchecked_into();
        Closure::wrap(Box::new(move |_target: JsValue, this: JsValue, args: JsValue| {
            let args = Array::from(&args);
            let call = OwnedCall::decode(cap, &this, &args);
            if cap == Capability::XhrOpen {
                let _ = Reflect::set(&this, &XHR_URL_KEY.into(), &args.get(1));
            }
            let action = shield.intercept(cap, &call.as_call());
            respond(cap, action, || Reflect::apply(&original, &this, &args))
        }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>)
    };
    let _ = Reflect::set(&handler, &"apply".into(), apply.as_ref());
    apply.forget();

    if construct {
        let construct: Trap = {
            let shield = Arc::clone(shield);
            let original: Function = original.clone().unchecked_into();
            Closure::wrap(Box::new(move |_target: JsValue, args: JsValue, _new_target: JsValue| {
                let args = Array::from(&args);
                let call = OwnedCall::decode(cap, &JsValue::UNDEFINED, &args);
                let action = shield.intercept(cap, &call.as_call());
                respond(cap, action, || Reflect::construct(&original, &args))
            }) as Box<dyn FnMut(JsValue, JsValue, JsValue) -> Result<JsValue, JsValue>>)
        };
        let _ = Reflect::set(&handler, &"construct".into(), construct.as_ref());
        construct.forget();
    }

    Proxy::new(original, &handler).into()
}

fn define_value(owner: &JsValue, property: &str, value: &JsValue, cap: Capability) -> Result<(), PatchError> {
    let descriptor = Object::new();
    let open = JsValue::from_bool(!pinned(cap));
    let _ = Reflect::set(&descriptor, &"value".into(), value);
    let _ = Reflect::set(&descriptor, &"writable".into(), &open);
    let _ = Reflect::set(&descriptor, &"configurable".into(), &open);
    define(owner, property, &descriptor, cap)
}

fn define(owner: &JsValue, property: &str, descriptor: &Object, cap: Capability) -> Result<(), PatchError> {
    match Reflect::define_property::<JsValue>(owner.unchecked_ref(), &property.into(), descriptor) {
        Ok(true) => Ok(()),
        Ok(false) => Err(PatchError::Locked(cap)),
        Err(e) => Err(PatchError::Host {
            capability: cap,
            reason: format!("{e:?}"),
        }),
    }
}

// =============================================================================
// Accessors
// =============================================================================

/// Property descriptor of `property`, searching up the prototype chain.
fn find_descriptor(owner: &JsValue, property: &str) -> Option<JsValue> {
    let key = JsValue::from_str(property);
    let mut current: Object = owner.clone().dyn_into().ok()?;
    loop {
        let descriptor = Object::get_own_property_descriptor(&current, &key);
        if !descriptor.is_undefined() {
            return Some(descriptor);
        }
        let next = Object::get_prototype_of(&current);
        if next.is_null() {
            return None;
        }
        current = next;
    }
}

/// Wrap a `(this, value)` hook as a plain function, so accessors see their
/// receiver.
fn with_receiver(hook: &JsValue) -> Result<JsValue, JsValue> {
    let make = Function::new_with_args("hook", "return function (value) { return hook(this, value); };");
    make.call1(&JsValue::NULL, hook)
}

fn define_accessor(
    owner: &JsValue,
    property: &str,
    cap: Capability,
    shield: &Arc<Shield>,
    original: &JsValue,
) -> Result<(), PatchError> {
    let host_error = |e: JsValue| PatchError::Host {
        capability: cap,
        reason: format!("{e:?}"),
    };
    let original_get = Reflect::get(original, &"get".into()).unwrap_or(JsValue::UNDEFINED);
    let original_set = Reflect::get(original, &"set".into()).unwrap_or(JsValue::UNDEFINED);
    let original_value = Reflect::get(original, &"value".into()).unwrap_or(JsValue::UNDEFINED);

    let getter: Hook = {
        let shield = Arc::clone(shield);
        Closure::wrap(Box::new(move |this: JsValue, _value: JsValue| {
            let action = shield.intercept(cap, &Call::Read);
            respond(cap, action, || match original_get.dyn_ref::<Function>() {
                Some(get) => get.call0(&this),
                None => Ok(original_value.clone()),
            })
        }) as Box<dyn FnMut(JsValue, JsValue) -> Result<JsValue, JsValue>>)
    };

    let setter: Hook = {
        let shield = Arc::clone(shield);
        Closure::wrap(Box::new(move |this: JsValue, value: JsValue| {
            let text = value.as_string().unwrap_or_default();
            let call = match cap {
                Capability::LocationHref => OwnedCall::Navigate(text),
                Capability::ImgSrc | Capability::ScriptSrc | Capability::IframeSrc => OwnedCall::Request(text),
                _ => OwnedCall::Write,
            };
            let action = shield.intercept(cap, &call.as_call());
            respond(cap, action, || match original_set.dyn_ref::<Function>() {
                Some(set) => set.call1(&this, &value),
                None => Ok(JsValue::UNDEFINED),
            })
        }) as Box<dyn FnMut(JsValue, JsValue) -> Result<JsValue, JsValue>>)
    };

    let descriptor = Object::new();
    let _ = Reflect::set(&descriptor, &"get".into(), &with_receiver(getter.as_ref()).map_err(host_error)?);
    let _ = Reflect::set(&descriptor, &"set".into(), &with_receiver(setter.as_ref()).map_err(host_error)?);
    let _ = Reflect::set(&descriptor, &"configurable".into(), &JsValue::from_bool(!pinned(cap)));
    let _ = Reflect::set(&descriptor, &"enumerable".into(), &JsValue::TRUE);
    getter.forget();
    setter.forget();
    define(owner, property, &descriptor, cap)
}

// =============================================================================
// Listeners, observer and sweep
// =============================================================================

fn call_method(target: &JsValue, method: &str, args: &[&JsValue]) -> Result<JsValue, JsValue> {
    let function: Function = Reflect::get(target, &method.into())?.dyn_into()?;
    let args: Array = args.iter().collect();
    Reflect::apply(&function, target, &args)
}

fn property_string(target: &JsValue, key: &str) -> Option<String> {
    if target.is_undefined() || target.is_null() {
        return None;
    }
    Reflect::get(target, &key.into()).ok()?.as_string()
}

fn attribute(element: &JsValue, name: &str) -> Option<String> {
    call_method(element, "getAttribute", &[&name.into()]).ok()?.as_string()
}

fn add_listener(window: &JsValue, event: &'static str, cap: Capability, shield: &Arc<Shield>) -> Result<(), JsValue> {
    let shield = Arc::clone(shield);
    let listener = Closure::wrap(Box::new(move |event: JsValue| {
        let action = match cap {
            Capability::PostMessage => {
                let data = Reflect::get(&event, &"data".into()).unwrap_or(JsValue::UNDEFINED);
                let payload = match data.as_string() {
                    Some(text) => text,
                    None => js_sys::JSON::stringify(&data).ok().and_then(|s| s.as_string()).unwrap_or_default(),
                };
                shield.intercept(cap, &Call::Message { payload: &payload })
            }
            _ => shield.intercept(cap, &Call::BeforeUnload),
        };
        if action != Action::Forward {
            let _ = call_method(&event, "stopImmediatePropagation", &[]);
        }
    }) as Box<dyn FnMut(JsValue)>);

    call_method(window, "addEventListener", &[&event.into(), listener.as_ref(), &JsValue::TRUE])?;
    listener.forget();

    if cap == Capability::BeforeUnload {
        // Handlers assigned as a property bypass the listener above.
        let descriptor = Object::new();
        let _ = Reflect::set(&descriptor, &"get".into(), &Function::new_with_args("", "return null;"));
        let _ = Reflect::set(&descriptor, &"set".into(), &Function::new_with_args("value", ""));
        let _ = Reflect::set(&descriptor, &"configurable".into(), &JsValue::TRUE);
        let _ = Reflect::define_property::<JsValue>(window.unchecked_ref(), &"onbeforeunload".into(), &descriptor);
    }
    Ok(())
}

/// Judge one element and detach it if the shield says so.
fn inspect(window: &JsValue, node: &JsValue, cap: Capability, shield: &Shield) {
    let Some(info) = element_info(window, node) else {
        return;
    };
    if let Action::Remove(reason) = shield.intercept(cap, &Call::Element(&info)) {
        log::debug!("removing <{}>: {reason:?}", info.tag);
        let _ = call_method(node, "remove", &[]);
    }
}

fn element_info(window: &JsValue, node: &JsValue) -> Option<ElementInfo> {
    let node_type = Reflect::get(node, &"nodeType".into()).ok()?.as_f64()?;
    if node_type != 1.0 {
        return None;
    }
    let tag = property_string(node, "localName")?.to_ascii_lowercase();
    let src = match tag.as_str() {
        "a" => attribute(node, "href"),
        "object" => attribute(node, "data"),
        _ => attribute(node, "src"),
    };

    let number = |target: &JsValue, key: &str| {
        Reflect::get(target, &key.into()).ok().and_then(|v| v.as_f64()).unwrap_or(0.0)
    };
    let style = call_method(window, "getComputedStyle", &[node]).unwrap_or(JsValue::UNDEFINED);
    let rect = call_method(node, "getBoundingClientRect", &[]).unwrap_or(JsValue::UNDEFINED);

    Some(ElementInfo {
        src,
        position: property_string(&style, "position").map_or(Position::Static, |p| Position::from_css(&p)),
        z_index: property_string(&style, "zIndex").and_then(|z| z.trim().parse().ok()),
        width: number(&rect, "width"),
        height: number(&rect, "height"),
        viewport_width: number(window, "innerWidth"),
        viewport_height: number(window, "innerHeight"),
        tag,
    })
}

fn inspect_tree(window: &JsValue, root: &JsValue, cap: Capability, shield: &Shield) {
    inspect(window, root, cap, shield);
    if let Ok(descendants) = call_method(root, "querySelectorAll", &[&SWEEP_SELECTOR.into()]) {
        for node in Array::from(&descendants).iter() {
            inspect(window, &node, cap, shield);
        }
    }
}

fn start_observer(window: &JsValue, cap: Capability, shield: &Arc<Shield>) -> Result<(), JsValue> {
    let shield = Arc::clone(shield);
    let win = window.clone();
    let callback = Closure::wrap(Box::new(move |records: JsValue, _observer: JsValue| {
        for record in Array::from(&records).iter() {
            if property_string(&record, "type").as_deref() == Some("attributes") {
                if let Ok(target) = Reflect::get(&record, &"target".into()) {
                    inspect(&win, &target, cap, &shield);
                }
                continue;
            }
            let Ok(added) = Reflect::get(&record, &"addedNodes".into()) else {
                continue;
            };
            for node in Array::from(&added).iter() {
                inspect_tree(&win, &node, cap, &shield);
            }
        }
    }) as Box<dyn FnMut(JsValue, JsValue)>);

    let observe = Function::new_with_args(
        "callback",
        "var o = new MutationObserver(callback); \
         o.observe(document.documentElement || document, \
           { childList: true, subtree: true, attributes: true, attributeFilter: ['src', 'href', 'style'] }); \
         return o;",
    );
    observe.call1(&JsValue::NULL, callback.as_ref())?;
    callback.forget();
    Ok(())
}

fn schedule_sweeps(window: &JsValue, cap: Capability, shield: &Arc<Shield>) -> Result<(), JsValue> {
    let schedule = shield.sweep_schedule();
    let shield = Arc::clone(shield);
    let win = window.clone();
    let sweep = Closure::wrap(Box::new(move || {
        let Ok(document) = Reflect::get(&win, &"document".into()) else {
            return;
        };
        if let Ok(nodes) = call_method(&document, "querySelectorAll", &[&SWEEP_SELECTOR.into()]) {
            for node in Array::from(&nodes).iter() {
                inspect(&win, &node, cap, &shield);
            }
        }
    }) as Box<dyn FnMut()>);

    for at in schedule.one_shots() {
        let ms = JsValue::from_f64(at.as_millis() as f64);
        call_method(window, "setTimeout", &[sweep.as_ref(), &ms])?;
    }
    if let Some(every) = schedule.interval() {
        let ms = JsValue::from_f64(every.as_millis() as f64);
        call_method(window, "setInterval", &[sweep.as_ref(), &ms])?;
    }
    sweep.forget();
    Ok(())
}
