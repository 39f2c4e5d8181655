//! WebAssembly bindings for the embed shield
//!
//! Two hosts load this module. The service worker calls `init` once, then
//! `handle_fetch` for every request and the lifecycle exports for install,
//! activate and message events. A shielded document calls `install_shield`
//! before any other script runs.

mod realm;
mod sink;
mod stubs;

use std::sync::{Arc, OnceLock};

use es_compiler::compile_lists;
use es_core::config::EngineConfig;
use es_core::hardening::{self, inject_into_head, script_tag, CapabilitySet, InstallOutcome, Shield};
use es_core::lifecycle::{Effect, Lifecycle, SW_VERSION};
use es_core::mediator::{Mediator, Outcome};
use es_core::navigation::interstitial_html;
use es_core::rules::RuleTables;
use es_core::snapshot::RuleSnapshot;
use es_core::telemetry::Telemetry;
use es_core::types::RequestContext;
use js_sys::{Array, Object, Reflect, Uint8Array};
use wasm_bindgen::prelude::*;

pub use realm::JsRealm;
use sink::{message_to_js, ConsoleSink, Delivery};

static MEDIATOR: OnceLock<Mediator> = OnceLock::new();
static LIFECYCLE: OnceLock<Lifecycle> = OnceLock::new();

/// `location.origin` of the global scope, for a worker or a window.
fn global_origin() -> Option<String> {
    let location = Reflect::get(&js_sys::global(), &"location".into()).ok()?;
    let origin = Reflect::get(&location, &"origin".into()).ok()?.as_string()?;
    (origin != "null").then_some(origin)
}

fn parse_config(config_json: Option<String>) -> Result<EngineConfig, JsValue> {
    let origin = global_origin();
    EngineConfig::from_json_in(config_json.as_deref().unwrap_or(""), origin.as_deref())
        .map_err(|e| JsValue::from_str(&format!("Invalid config: {e}")))
}

fn load_tables(snapshot_json: Option<String>) -> Result<RuleTables, JsValue> {
    match snapshot_json {
        Some(text) => RuleSnapshot::load(&text)
            .and_then(RuleSnapshot::into_tables)
            .map_err(|e| JsValue::from_str(&format!("Failed to load snapshot: {e}"))),
        None => Ok(RuleTables::builtin()),
    }
}

fn lifecycle() -> &'static Lifecycle {
    LIFECYCLE.get_or_init(Lifecycle::default)
}

fn set(target: &Object, key: &str, value: &JsValue) {
    let _ = Reflect::set(target, &key.into(), value);
}

// =============================================================================
// Service worker side
// =============================================================================

/// Build the mediator. `snapshot_json` is a compiled rule snapshot; the
/// builtin tables are used without one.
#[wasm_bindgen]
pub fn init(config_json: Option<String>, snapshot_json: Option<String>) -> Result<(), JsValue> {
    if MEDIATOR.get().is_some() {
        return Err(JsValue::from_str("Already initialized. Restart the worker to reinitialize."));
    }

    let config = parse_config(config_json)?;
    let tables = load_tables(snapshot_json)?;
    let telemetry = Telemetry::new(Arc::new(ConsoleSink::new(Delivery::Clients)), config.telemetry_detail_chars);
    let mediator =
        Mediator::new(&tables, &config, telemetry).map_err(|e| JsValue::from_str(&format!("Invalid config: {e}")))?;

    let _ = LIFECYCLE.set(Lifecycle::new(config.immediate_activation));
    MEDIATOR
        .set(mediator)
        .map_err(|_| JsValue::from_str("Failed to set mediator state"))
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    MEDIATOR.get().is_some()
}

/// Mediate one fetch event.
///
/// Returns `{action: "pass"}` or `{action: "respond", status, statusText,
/// headers, body}`. Before `init` every request passes.
#[wasm_bindgen]
pub fn handle_fetch(url: &str, mode: &str, destination: &str, referrer: Option<String>) -> JsValue {
    let result = Object::new();
    let Some(mediator) = MEDIATOR.get() else {
        set(&result, "action", &"pass".into());
        return result.into();
    };

    let ctx = RequestContext::from_fetch(url, mode, destination).with_referrer(referrer.as_deref());
    match mediator.handle(&ctx) {
        Outcome::PassThrough => set(&result, "action", &"pass".into()),
        Outcome::Respond(response) => {
            set(&result, "action", &"respond".into());
            set(&result, "status", &JsValue::from(response.status));
            set(&result, "statusText", &response.status_text.into());
            let headers = Array::new();
            for (name, value) in &response.headers {
                headers.push(&Array::of2(&name.into(), &value.into()));
            }
            set(&result, "headers", &headers);
            set(&result, "body", &Uint8Array::from(response.body.as_slice()));
        }
    }
    result.into()
}

fn effects_to_js(effects: Vec<Effect>) -> JsValue {
    let list = Array::new();
    for effect in effects {
        let entry = Object::new();
        match effect {
            Effect::Reply(message) => {
                set(&entry, "kind", &"reply".into());
                set(&entry, "message", &message_to_js(&message));
            }
            Effect::Broadcast(message) => {
                set(&entry, "kind", &"broadcast".into());
                set(&entry, "message", &message_to_js(&message));
            }
            Effect::SkipWaiting => set(&entry, "kind", &"skipWaiting".into()),
            Effect::ClaimClients => set(&entry, "kind", &"claimClients".into()),
        }
        list.push(&entry);
    }
    list.into()
}

#[wasm_bindgen]
pub fn on_install() -> JsValue {
    effects_to_js(lifecycle().on_install())
}

#[wasm_bindgen]
pub fn on_activate() -> JsValue {
    effects_to_js(lifecycle().on_activate())
}

/// Handle a `message` event payload. Unknown messages yield no effects.
#[wasm_bindgen]
pub fn handle_message(data: JsValue) -> JsValue {
    let payload = match data.as_string() {
        Some(text) => serde_json::Value::String(text),
        None => js_sys::JSON::stringify(&data)
            .ok()
            .and_then(|s| s.as_string())
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or(serde_json::Value::Null),
    };
    effects_to_js(lifecycle().on_message(&payload))
}

#[wasm_bindgen]
pub fn sw_version() -> String {
    SW_VERSION.to_string()
}

/// May the wrapper page frame this URL?
#[wasm_bindgen]
pub fn validate_embed_url(url: &str) -> bool {
    match MEDIATOR.get() {
        Some(mediator) => mediator.validate_embed_url(url),
        None => Mediator::with_builtin(&EngineConfig::default(), Telemetry::null())
            .map(|m| m.validate_embed_url(url))
            .unwrap_or(false),
    }
}

#[wasm_bindgen]
pub fn interstitial(hostname: &str) -> String {
    interstitial_html(hostname)
}

/// Compile rule list texts into snapshot JSON.
#[wasm_bindgen]
pub fn compile_rule_lists(list_texts: JsValue) -> Result<String, JsValue> {
    let list_array = Array::from(&list_texts);
    if list_array.length() == 0 {
        return Err(JsValue::from_str("No list texts provided"));
    }
    let texts = list_array
        .iter()
        .map(|value| value.as_string().ok_or_else(|| JsValue::from_str("List text must be a string")))
        .collect::<Result<Vec<_>, _>>()?;
    let texts: Vec<&str> = texts.iter().map(String::as_str).collect();

    let (snapshot, _) = compile_lists(&texts, RuleTables::default()).map_err(|e| JsValue::from_str(&e.to_string()))?;
    snapshot.to_json().map_err(|e| JsValue::from_str(&e.to_string()))
}

// =============================================================================
// Document side
// =============================================================================

/// Harden the current document. Must run before any other script.
///
/// Returns `{crossOrigin, installed, gaps}` with capability names.
#[wasm_bindgen]
pub fn install_shield(config_json: Option<String>, snapshot_json: Option<String>) -> Result<JsValue, JsValue> {
    let config = parse_config(config_json)?;
    let tables = load_tables(snapshot_json)?;
    let window = js_sys::global();
    let document_url = Reflect::get(&window, &"location".into())
        .and_then(|location| Reflect::get(&location, &"href".into()))
        .ok()
        .and_then(|href| href.as_string())
        .unwrap_or_default();

    let telemetry = Telemetry::new(Arc::new(ConsoleSink::new(Delivery::Parent)), config.telemetry_detail_chars);
    let mut realm = JsRealm::new(window.into());
    // about:blank and srcdoc frames report their creator's origin here.
    let inherited_origin = global_origin();
    let shield = Arc::new(
        Shield::for_document_inheriting(&document_url, inherited_origin.as_deref(), &tables, &config, telemetry)
            .map_err(|e| JsValue::from_str(&format!("Cannot shield {document_url}: {e}")))?,
    );
    stubs::attach(&shield);

    let result = Object::new();
    match hardening::install(&mut realm, &shield) {
        InstallOutcome::CrossOrigin => set(&result, "crossOrigin", &JsValue::TRUE),
        InstallOutcome::Installed(installation) => {
            set(&result, "crossOrigin", &JsValue::FALSE);
            let names = |caps: CapabilitySet| -> Array {
                caps.capabilities().map(|cap| JsValue::from_str(cap.name())).collect()
            };
            set(&result, "installed", &names(installation.installed));
            set(&result, "gaps", &names(installation.gaps));
        }
    }
    Ok(result.into())
}

/// Put the shield script first in `<head>` of a served document.
#[wasm_bindgen]
pub fn inject_shield(html: &str, script_src: &str) -> String {
    inject_into_head(html, &script_tag(script_src))
}
