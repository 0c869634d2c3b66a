//! Tunables for the synchronization engine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options that control debouncing, windowing and selection helpers.
///
/// All fields have defaults, so hosts can deserialize a partial table from their own config
/// file and override only what they need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Debounce before committing edits to a fully materialized document.
    pub debounce_ms: u64,
    /// Debounce before committing edits to a windowed document.
    pub huge_debounce_ms: u64,
    /// Documents with at least this many lines are edited in windowed mode.
    pub huge_line_threshold: usize,
    /// Margin around the viewport used for token re-sync ranges.
    pub window_buffer_lines: usize,
    /// Margin around the viewport for windowed segments.
    pub huge_window_buffer_lines: usize,
    /// How long the window stays locked after composition ends.
    pub ime_unlock_delay_ms: u64,
    /// Enables bracket/quote pair highlighting.
    pub pair_highlight: bool,
    /// Plain-text rendering mode (disables pair highlighting).
    pub plain_text: bool,
    /// Lines longer than this (in code units) are never scanned for pairs.
    pub max_pair_scan_line_len: usize,
    /// Rows from a viewport edge where rectangular drags start auto-scrolling.
    pub autoscroll_edge_rows: usize,
}

/// Whole milliseconds of `duration`, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce_ms: 120,
            huge_debounce_ms: 400,
            huge_line_threshold: 20_000,
            window_buffer_lines: 40,
            huge_window_buffer_lines: 200,
            ime_unlock_delay_ms: 150,
            pair_highlight: true,
            plain_text: false,
            max_pair_scan_line_len: 4096,
            autoscroll_edge_rows: 2,
        }
    }
}

impl SyncOptions {
    /// Set both debounce delays.
    pub fn with_debounce(mut self, normal: Duration, huge: Duration) -> Self {
        self.debounce_ms = millis(normal);
        self.huge_debounce_ms = millis(huge);
        self
    }

    /// Set the line count at which documents switch to windowed mode.
    pub fn with_huge_line_threshold(mut self, lines: usize) -> Self {
        self.huge_line_threshold = lines;
        self
    }

    /// Set the windowed-mode buffer margin.
    pub fn with_huge_window_buffer(mut self, lines: usize) -> Self {
        self.huge_window_buffer_lines = lines;
        self
    }

    /// Set the composition unlock delay.
    pub fn with_ime_unlock_delay(mut self, delay: Duration) -> Self {
        self.ime_unlock_delay_ms = millis(delay);
        self
    }

    /// Toggle plain-text mode.
    pub fn with_plain_text(mut self, plain_text: bool) -> Self {
        self.plain_text = plain_text;
        self
    }

    /// Debounce delay for the given mode.
    pub fn debounce_for(&self, windowed: bool) -> Duration {
        if windowed {
            Duration::from_millis(self.huge_debounce_ms)
        } else {
            Duration::from_millis(self.debounce_ms)
        }
    }

    /// Delay between composition end and window unlock.
    pub fn ime_unlock_delay(&self) -> Duration {
        Duration::from_millis(self.ime_unlock_delay_ms)
    }

    /// Returns `true` if a document of `total_lines` lines is edited in windowed mode.
    pub fn is_huge(&self, total_lines: usize) -> bool {
        total_lines >= self.huge_line_threshold
    }

    /// Returns `true` if pair highlighting is active.
    pub fn pair_highlight_enabled(&self) -> bool {
        self.pair_highlight && !self.plain_text
    }
}
