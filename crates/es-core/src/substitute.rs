//! Substitute responses
//!
//! Empty payloads typed to match what the requester expects, so its
//! error-handling path never retries or escalates. Substitutes are cached by
//! signature; the same decision always produces the same bytes, so a race
//! between two writers of one key is harmless.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use crate::hash::Signature;
use crate::types::{BlockCategory, SubstituteKind};

/// Header that marks every response produced by the shield.
pub const BLOCKED_HEADER: &str = "X-Shield-Blocked";

/// Smallest valid transparent GIF (1x1, one transparent palette entry).
pub const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00, 0x00, 0x00,
    0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// A response served in place of the real one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstituteResponse {
    pub status: u16,
    pub status_text: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl SubstituteResponse {
    /// Empty payload of the given kind, HTTP 200.
    pub fn empty(kind: SubstituteKind, category: BlockCategory) -> Self {
        let (content_type, body) = match kind {
            SubstituteKind::Script => ("application/javascript; charset=utf-8", Vec::new()),
            SubstituteKind::Image => ("image/gif", TRANSPARENT_GIF.to_vec()),
            SubstituteKind::Stylesheet => ("text/css; charset=utf-8", Vec::new()),
            SubstituteKind::Document => ("text/html; charset=utf-8", Vec::new()),
            SubstituteKind::Text => ("text/plain; charset=utf-8", Vec::new()),
        };
        Self {
            status: 200,
            status_text: "OK",
            headers: blocked_headers(content_type, category),
            body,
        }
    }

    /// Bodiless cancellation, HTTP 204.
    pub fn no_content(category: BlockCategory) -> Self {
        Self {
            status: 204,
            status_text: "Blocked",
            headers: vec![(BLOCKED_HEADER.to_string(), category.as_str().to_string())],
            body: Vec::new(),
        }
    }

    /// HTML document, HTTP 200, never cached by the browser.
    pub fn html(body: String, category: BlockCategory) -> Self {
        let mut headers = blocked_headers("text/html; charset=utf-8", category);
        headers.push(("Cache-Control".to_string(), "no-store".to_string()));
        Self {
            status: 200,
            status_text: "OK",
            headers,
            body: body.into_bytes(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }
}

fn blocked_headers(content_type: &str, category: BlockCategory) -> Vec<(String, String)> {
    vec![
        ("Content-Type".to_string(), content_type.to_string()),
        (BLOCKED_HEADER.to_string(), category.as_str().to_string()),
    ]
}

// =============================================================================
// LRU Cache
// =============================================================================

/// Simple fixed-size cache.
/// Uses a basic LRU strategy with a hashmap + deque.
pub struct LruCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    /// Get a value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if self.entries.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push_back(key.clone());
        }
        self.entries.get(key)
    }

    /// Insert a value, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Shared cache of substitute responses keyed by blocked-request signature.
pub struct ResponseCache {
    inner: Mutex<LruCache<Signature, Arc<SubstituteResponse>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cached response for `key`, building it with `make` on a miss.
    ///
    /// The builder runs outside the lock. Two racing misses both build, and
    /// the second insert overwrites an identical value.
    pub fn get_or_insert_with<F>(&self, key: Signature, make: F) -> Arc<SubstituteResponse>
    where
        F: FnOnce() -> SubstituteResponse,
    {
        if let Some(hit) = self.lock().get(&key) {
            return Arc::clone(hit);
        }
        let response = Arc::new(make());
        self.lock().insert(key, Arc::clone(&response));
        response
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<Signature, Arc<SubstituteResponse>>> {
        // Entries are immutable once built, so a poisoned lock still holds valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
