//! Stand-ins for windows and locations a script must never reach.
//!
//! `window.top` and `window.parent` resolve to an ancestor stub, `window.open`
//! returns a closed-window stub, and both expose a location stub. Every
//! property answers with a fixed value and every write is swallowed, so
//! `window.top.location = url` only ever touches the stub.

/// Which stub is being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    /// Spoofed `top`/`parent`
    Ancestor,
    /// Return value of a blocked `window.open`
    ClosedWindow,
    /// `location` of either stub
    Location,
}

/// Value a binding should hand back for a stub property read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StubValue {
    /// Another stub (including the same one)
    Stub(StubKind),
    /// A function that ignores its arguments and returns undefined
    Noop,
    /// `window.open` on a stub: returns a closed-window stub
    OpenStub,
    Bool(bool),
    Number(f64),
    Str(&'static str),
    Null,
    Undefined,
}

/// Closed-window stub for a suppressed popup.
pub const CLOSED_WINDOW: StubValue = StubValue::Stub(StubKind::ClosedWindow);

/// Ancestor stub for `top`/`parent`.
pub const ANCESTOR: StubValue = StubValue::Stub(StubKind::Ancestor);

const WINDOW_METHODS: &[&str] = &[
    "postMessage", "close", "focus", "blur", "alert", "confirm", "prompt", "print",
    "addEventListener", "removeEventListener", "dispatchEvent", "stop", "scrollTo", "moveTo", "resizeTo",
];

const LOCATION_METHODS: &[&str] = &["assign", "replace", "reload", "toString", "valueOf"];

/// Answer a property read on a stub.
pub fn read(kind: StubKind, property: &str) -> StubValue {
    match kind {
        StubKind::Ancestor | StubKind::ClosedWindow => read_window(kind, property),
        StubKind::Location => read_location(property),
    }
}

fn read_window(kind: StubKind, property: &str) -> StubValue {
    match property {
        "location" => StubValue::Stub(StubKind::Location),
        "top" | "parent" | "self" | "window" | "frames" => StubValue::Stub(kind),
        "open" => StubValue::OpenStub,
        "closed" => StubValue::Bool(kind == StubKind::ClosedWindow),
        "length" => StubValue::Number(0.0),
        "name" => StubValue::Str(""),
        "opener" | "document" | "frameElement" => StubValue::Null,
        p if WINDOW_METHODS.contains(&p) => StubValue::Noop,
        _ => StubValue::Undefined,
    }
}

fn read_location(property: &str) -> StubValue {
    match property {
        "href" => StubValue::Str("about:blank"),
        "origin" => StubValue::Str("null"),
        "protocol" => StubValue::Str("about:"),
        "host" | "hostname" | "port" | "search" | "hash" => StubValue::Str(""),
        "pathname" => StubValue::Str("blank"),
        p if LOCATION_METHODS.contains(&p) => StubValue::Noop,
        _ => StubValue::Undefined,
    }
}

/// Writes that would have navigated a real window.
pub fn is_navigating_write(kind: StubKind, property: &str) -> bool {
    match kind {
        StubKind::Ancestor | StubKind::ClosedWindow => property == "location",
        StubKind::Location => matches!(property, "href" | "pathname" | "search" | "hash" | "host" | "hostname"),
    }
}
