//! DOM mutation defense
//!
//! Inserted elements are judged on two signals: a source attribute that
//! resolves to a blocked host, and the ad-overlay shape (positioned, stacked
//! high, covering a large share of the viewport). The observer judges each
//! insertion; the sweep re-judges the whole document on a fixed schedule for
//! anything the observer missed.

use std::time::Duration;

use crate::config::{OverlayConfig, SweepConfig};

/// CSS `position` of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    Static,
    Relative,
    Absolute,
    Fixed,
    Sticky,
}

impl Position {
    pub fn from_css(value: &str) -> Self {
        match value.trim() {
            "relative" => Self::Relative,
            "absolute" => Self::Absolute,
            "fixed" => Self::Fixed,
            "sticky" => Self::Sticky,
            _ => Self::Static,
        }
    }

    #[inline]
    pub fn is_out_of_flow(self) -> bool {
        matches!(self, Self::Absolute | Self::Fixed)
    }
}

/// What the binding knows about one element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ElementInfo {
    /// Lowercase tag name
    pub tag: String,
    /// `src` (or `href` for links), as written
    pub src: Option<String>,
    pub position: Position,
    /// Computed z-index, `None` for `auto`
    pub z_index: Option<i64>,
    pub width: f64,
    pub height: f64,
    pub viewport_width: f64,
    pub viewport_height: f64,
}

impl ElementInfo {
    /// Positioned, stacked above the page and wider or taller than the
    /// configured share of the viewport.
    pub fn is_overlay(&self, overlay: &OverlayConfig) -> bool {
        if !self.position.is_out_of_flow() {
            return false;
        }
        if self.z_index.map_or(true, |z| z < overlay.min_z_index) {
            return false;
        }
        let wide = self.viewport_width > 0.0 && self.width / self.viewport_width > overlay.min_viewport_fraction;
        let tall = self.viewport_height > 0.0 && self.height / self.viewport_height > overlay.min_viewport_fraction;
        wide || tall
    }

    /// Elements that carry a network source.
    pub fn has_source(&self) -> bool {
        matches!(self.tag.as_str(), "img" | "script" | "iframe" | "frame" | "embed" | "object" | "source" | "video" | "audio" | "a")
            && self.src.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// Why an element is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    BlockedSource,
    Overlay,
}

// =============================================================================
// Sweep schedule
// =============================================================================

/// Delays between fallback sweeps: the one-shot delays first, then the
/// steady interval forever.
#[derive(Debug, Clone)]
pub struct SweepSchedule {
    initial: Vec<Duration>,
    next: usize,
    interval: Option<Duration>,
    elapsed: Duration,
}

impl SweepSchedule {
    pub fn new(config: &SweepConfig) -> Self {
        let mut initial: Vec<Duration> = config.initial_ms.iter().map(|&ms| Duration::from_millis(ms as u64)).collect();
        initial.sort_unstable();
        initial.dedup();
        Self {
            initial,
            next: 0,
            interval: (config.interval_ms > 0).then(|| Duration::from_millis(config.interval_ms as u64)),
            elapsed: Duration::ZERO,
        }
    }

    /// Offsets from installation at which the one-shot sweeps run.
    pub fn one_shots(&self) -> &[Duration] {
        &self.initial
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }
}

impl Iterator for SweepSchedule {
    /// Delay until the next sweep, relative to the previous one.
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if let Some(&at) = self.initial.get(self.next) {
            self.next += 1;
            let delay = at.saturating_sub(self.elapsed);
            self.elapsed = at;
            return Some(delay);
        }
        self.interval
    }
}
