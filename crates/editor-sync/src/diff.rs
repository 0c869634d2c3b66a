//! Minimal single-region text diffs.
//!
//! The synchronization engine never ships whole documents to the backend. Instead it compares
//! the last confirmed text with the live text and sends only the contiguous region in between
//! the common prefix and the common suffix.
//!
//! Offsets in [`TextDiff`] are **UTF-16 code units** in the old text (the unit host surfaces
//! use). The prefix/suffix scans advance one scalar at a time, so a diff boundary never splits
//! a surrogate pair and [`TextDiff::to_scalar`] is exact.

use crate::coords::{code_unit_to_byte, code_unit_to_scalar, line_count, utf16_len};

/// A single contiguous replacement, expressed in UTF-16 code units of the old text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiff {
    /// Inclusive start offset in the old text.
    pub start: usize,
    /// Exclusive end offset in the old text.
    pub end: usize,
    /// Text that replaces `start..end`.
    pub replacement: String,
}

/// A point edit addressed by Unicode scalar index, as the backend expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarEdit {
    /// Inclusive start scalar index.
    pub start_scalar: usize,
    /// Exclusive end scalar index.
    pub end_scalar: usize,
    /// Replacement text.
    pub new_text: String,
}

/// A whole-line replacement relative to the start of the diffed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineReplace {
    /// First replaced line (0-based, relative to the diffed text).
    pub start_line: usize,
    /// Exclusive end line in the old text.
    pub end_line: usize,
    /// Newline-joined replacement lines.
    pub new_text: String,
    /// Number of lines the replacement spans.
    pub new_line_count: usize,
}

impl TextDiff {
    /// Returns `true` if this is a pure insertion.
    pub fn is_insertion(&self) -> bool {
        self.start == self.end
    }

    /// Convert the code-unit range into scalar indices against `old`.
    pub fn to_scalar(&self, old: &str) -> ScalarEdit {
        ScalarEdit {
            start_scalar: code_unit_to_scalar(old, self.start),
            end_scalar: code_unit_to_scalar(old, self.end),
            new_text: self.replacement.clone(),
        }
    }

    /// Widen the diff to whole lines.
    ///
    /// The result covers every old line touched by `start..end` and the matching lines of
    /// `new`, so replacing `start_line..end_line` of `old` with `new_text` yields `new`.
    pub fn to_line_replace(&self, old: &str, new: &str) -> LineReplace {
        let start_byte = code_unit_to_byte(old, self.start);
        let end_byte = code_unit_to_byte(old, self.end);

        let start_line = old[..start_byte].matches('\n').count();
        let last_old_line = start_line + old[start_byte..end_byte].matches('\n').count();
        let old_lines = line_count(old);
        let new_lines = line_count(new);

        // Lines after the diff are shared by both texts; only the line delta moves them.
        let trailing = old_lines - (last_old_line + 1);
        let last_new_line = new_lines - trailing - 1;

        let new_text = new
            .split('\n')
            .skip(start_line)
            .take(last_new_line + 1 - start_line)
            .collect::<Vec<_>>()
            .join("\n");

        LineReplace {
            start_line,
            end_line: last_old_line + 1,
            new_line_count: last_new_line + 1 - start_line,
            new_text,
        }
    }
}

/// Compute the minimal contiguous edit that turns `old` into `new`.
///
/// Returns `None` when the texts are equal. The common prefix and suffix never overlap:
/// `prefix + suffix <= min(old_len, new_len)` holds for repeated-character inputs too.
pub fn build_diff(old: &str, new: &str) -> Option<TextDiff> {
    if old == new {
        return None;
    }

    let mut prefix_bytes = 0;
    for (a, b) in old.chars().zip(new.chars()) {
        if a != b {
            break;
        }
        prefix_bytes += a.len_utf8();
    }

    let old_rest = &old[prefix_bytes..];
    let new_rest = &new[prefix_bytes..];
    let mut suffix_bytes = 0;
    for (a, b) in old_rest.chars().rev().zip(new_rest.chars().rev()) {
        if a != b {
            break;
        }
        suffix_bytes += a.len_utf8();
    }

    let start = utf16_len(&old[..prefix_bytes]);
    let end = start + utf16_len(&old_rest[..old_rest.len() - suffix_bytes]);
    let replacement = new_rest[..new_rest.len() - suffix_bytes].to_string();

    Some(TextDiff {
        start,
        end,
        replacement,
    })
}

/// Apply a diff produced by [`build_diff`] to `old`.
pub fn apply_diff(old: &str, diff: &TextDiff) -> String {
    let start = code_unit_to_byte(old, diff.start);
    let end = code_unit_to_byte(old, diff.end).max(start);
    let mut out = String::with_capacity(old.len() - (end - start) + diff.replacement.len());
    out.push_str(&old[..start]);
    out.push_str(&diff.replacement);
    out.push_str(&old[end..]);
    out
}
