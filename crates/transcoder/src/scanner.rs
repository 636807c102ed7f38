//! Scanners over the encoder's combined output.
//!
//! The encoder's text output is the only channel it offers, so the exact
//! trigger substring and timestamp pattern below are what the supervisor
//! depends on. Everything that knows about that text lives here.

use regex_lite::Regex;
use std::sync::LazyLock;

/// Substring the encoder prints when the destination already exists.
pub const OVERWRITE_TRIGGER: &str = "already exists. Overwrite?";

/// Marker preceding the encoded-time field in a status line.
pub const TIME_MARKER: &str = "time=";

static CLOCK_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{2}):(\d{2}):(\d{2})").ok());

/// Whether `chunk` carries an overwrite prompt.
pub fn is_overwrite_prompt(chunk: &str) -> bool {
    chunk.contains(OVERWRITE_TRIGGER)
}

/// Overwrite prompt detection across consecutive reads.
///
/// Keeps the last `OVERWRITE_TRIGGER.len() - 1` bytes of what it was fed, so
/// a trigger split between two reads is still seen, and seen once.
#[derive(Debug, Clone, Default)]
pub struct PromptDetector {
    tail: String,
}

impl PromptDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk; true when a prompt ends in it.
    pub fn feed(&mut self, chunk: &str) -> bool {
        self.tail.push_str(chunk);
        if is_overwrite_prompt(&self.tail) {
            self.tail.clear();
            return true;
        }
        let mut cut = self.tail.len().saturating_sub(OVERWRITE_TRIGGER.len() - 1);
        while !self.tail.is_char_boundary(cut) {
            cut += 1;
        }
        self.tail.drain(..cut);
        false
    }
}

/// Extracts the encoded position in seconds from a status chunk.
///
/// The chunk must contain `time=`; the first `HH:MM:SS` anywhere in the
/// chunk is then taken. Fractional seconds are not part of the pattern.
pub fn extract_timestamp(chunk: &str) -> Option<f64> {
    if !chunk.contains(TIME_MARKER) {
        return None;
    }
    let caps = CLOCK_RE.as_ref()?.captures(chunk)?;
    let hours: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minutes: u32 = caps.get(2)?.as_str().parse().ok()?;
    let seconds: u32 = caps.get(3)?.as_str().parse().ok()?;
    Some(f64::from(hours * 3600 + minutes * 60 + seconds))
}

/// Elapsed/total bookkeeping for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressState {
    elapsed_secs: f64,
    total_secs: Option<f64>,
    accepted: u64,
}

impl ProgressState {
    /// `total` is the source duration minus `safety_margin`; it stays unknown
    /// when the duration is missing or the result is not positive.
    pub fn new(duration_secs: Option<f64>, safety_margin: f64) -> Self {
        let total_secs = duration_secs
            .map(|d| d - safety_margin)
            .filter(|t| t.is_finite() && *t > 0.0);
        Self {
            elapsed_secs: 0.0,
            total_secs,
            accepted: 0,
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed_secs
    }

    pub fn total_secs(&self) -> Option<f64> {
        self.total_secs
    }

    /// Number of timestamps that advanced the state.
    pub fn accepted_updates(&self) -> u64 {
        self.accepted
    }

    /// Feeds one parsed timestamp. Returns the new elapsed value when the
    /// state advanced, `None` when the timestamp was dropped.
    ///
    /// Dropped: unknown total, no forward pace (duplicates and regressions),
    /// and a first timestamp already at or past the total, which is the
    /// encoder echoing the source duration before any frame is written.
    pub fn advance(&mut self, parsed_secs: f64) -> Option<f64> {
        let total = self.total_secs?;
        if !parsed_secs.is_finite() {
            return None;
        }
        let pace = parsed_secs - self.elapsed_secs;
        if pace <= 0.0 {
            return None;
        }
        if self.accepted == 0 && parsed_secs >= total {
            return None;
        }
        self.elapsed_secs += pace;
        self.accepted += 1;
        Some(self.elapsed_secs)
    }
}
