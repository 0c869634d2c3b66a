//! Coordinate mapping between the units the editing pipeline speaks.
//!
//! Four coordinate systems meet in this crate:
//!
//! - **offset**: UTF-16 code-unit offset into a text. This is what host edit surfaces report
//!   for carets and selections.
//! - **scalar index**: Unicode scalar value (Rust `char`) index. This is how the backend
//!   addresses point edits.
//! - **line / column**: 1-based line, 0-based column (in code units) within that line.
//! - **display offset**: offset into the surface text, where a trailing empty line carries one
//!   [`DISPLAY_PLACEHOLDER`] unit so that the host can place a caret on it.
//!
//! Every function here is pure and total: out-of-range inputs clamp to the nearest valid value.

/// Zero-width unit appended after a final `'\n'` in the display text.
pub const DISPLAY_PLACEHOLDER: char = '\u{200B}';

/// A 1-based line with a 0-based column, both derived from a code-unit offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineColumn {
    /// 1-based line number.
    pub line: usize,
    /// 0-based column in UTF-16 code units.
    pub column: usize,
}

impl LineColumn {
    /// Create a new line/column pair.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Length of `text` in UTF-16 code units.
pub fn utf16_len(text: &str) -> usize {
    text.chars().map(char::len_utf16).sum()
}

/// Convert a code-unit offset into a line/column pair.
pub fn offset_to_line_column(text: &str, offset: usize) -> LineColumn {
    let mut line = 1;
    let mut line_start = 0;
    let mut units = 0;

    for ch in text.chars() {
        if units >= offset {
            break;
        }
        units += ch.len_utf16();
        if ch == '\n' {
            line += 1;
            line_start = units;
        }
    }

    // `units` overshoots by one when `offset` falls inside a surrogate pair; the column still
    // counts code units so the inverse mapping reproduces `offset` exactly.
    let clamped = offset.min(utf16_len(text));
    LineColumn::new(line, clamped.saturating_sub(line_start))
}

/// Convert a line/column pair back into a code-unit offset.
///
/// Line `0` is treated as line `1`. A line past the last line clamps to the end of the text;
/// a column past the end of its line clamps to the end of that line.
pub fn line_column_to_offset(text: &str, line: usize, column: usize) -> usize {
    let target = line.max(1);
    let mut current = 1;
    let mut units = 0;
    let mut line_start = None;

    if target == 1 {
        line_start = Some(0);
    } else {
        for ch in text.chars() {
            units += ch.len_utf16();
            if ch == '\n' {
                current += 1;
                if current == target {
                    line_start = Some(units);
                    break;
                }
            }
        }
    }

    let Some(start) = line_start else {
        return utf16_len(text);
    };

    let line_len = line_len_from(text, start);
    start + column.min(line_len)
}

fn line_len_from(text: &str, line_start: usize) -> usize {
    let byte_start = code_unit_to_byte(text, line_start);
    text[byte_start..]
        .chars()
        .take_while(|&ch| ch != '\n')
        .map(char::len_utf16)
        .sum()
}

/// Convert a code-unit offset into a scalar index.
///
/// Offsets that land inside a surrogate pair round down to the scalar that starts the pair.
pub fn code_unit_to_scalar(text: &str, offset: usize) -> usize {
    let mut units = 0;
    let mut scalars = 0;
    for ch in text.chars() {
        let next = units + ch.len_utf16();
        if next > offset {
            break;
        }
        units = next;
        scalars += 1;
    }
    scalars
}

/// Convert a scalar index into a code-unit offset (clamped to the end of `text`).
pub fn scalar_to_code_unit(text: &str, scalar: usize) -> usize {
    text.chars().take(scalar).map(char::len_utf16).sum()
}

/// Convert a code-unit offset into a UTF-8 byte offset that is always a char boundary.
///
/// Mid-surrogate offsets round down, like [`code_unit_to_scalar`].
pub fn code_unit_to_byte(text: &str, offset: usize) -> usize {
    let mut units = 0;
    for (byte, ch) in text.char_indices() {
        let next = units + ch.len_utf16();
        if next > offset {
            return byte;
        }
        units = next;
    }
    text.len()
}

/// Convert a UTF-8 byte offset into a code-unit offset.
///
/// Byte offsets that are not char boundaries round down.
pub fn byte_to_code_unit(text: &str, byte: usize) -> usize {
    let mut end = byte.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    utf16_len(&text[..end])
}

/// Number of lines in `text` (`N` newlines => `N + 1` lines; `""` has one line).
pub fn line_count(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count() + 1
}

/// Returns `true` if `text` needs a display placeholder (its last line is empty and follows a
/// newline).
pub fn needs_placeholder(text: &str) -> bool {
    text.ends_with('\n')
}

/// Convert document text into the text shown on the edit surface.
pub fn to_display_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + DISPLAY_PLACEHOLDER.len_utf8());
    out.push_str(text);
    if needs_placeholder(text) {
        out.push(DISPLAY_PLACEHOLDER);
    }
    out
}

/// Display offset of the placeholder [`to_display_text`] adds to `text`, if any.
pub fn placeholder_offset(text: &str) -> Option<usize> {
    needs_placeholder(text).then(|| utf16_len(text))
}

/// Returns `placeholder` if the display text really carries a placeholder unit there.
fn verified_placeholder(display: &str, placeholder: Option<usize>) -> Option<usize> {
    let at = placeholder?;
    let byte = code_unit_to_byte(display, at);
    let found = byte_to_code_unit(display, byte) == at
        && display[byte..].starts_with(DISPLAY_PLACEHOLDER);
    found.then_some(at)
}

/// Convert surface text back into document text.
///
/// Only the unit at `placeholder` (as reported by [`placeholder_offset`] or
/// [`track_placeholder`]) is dropped; placeholder characters anywhere else are document content.
pub fn from_display_text(display: &str, placeholder: Option<usize>) -> String {
    let Some(at) = verified_placeholder(display, placeholder) else {
        return display.to_string();
    };
    let byte = code_unit_to_byte(display, at);
    let mut text = String::with_capacity(display.len());
    text.push_str(&display[..byte]);
    text.push_str(&display[byte + DISPLAY_PLACEHOLDER.len_utf8()..]);
    text
}

/// Map a display offset onto the document text, subtracting the placeholder if it precedes
/// `offset`.
pub fn display_to_text_offset(display: &str, placeholder: Option<usize>, offset: usize) -> usize {
    let clamped = offset.min(utf16_len(display));
    match verified_placeholder(display, placeholder) {
        Some(at) if clamped > at => clamped - 1,
        _ => clamped,
    }
}

/// Map a document offset into the display text produced by [`to_display_text`].
///
/// The placeholder sits at the very end of the display text, so every document offset maps to
/// itself; offsets past the end clamp to the end of the document.
pub fn text_to_display_offset(text: &str, offset: usize) -> usize {
    offset.min(utf16_len(text))
}

/// Follow the placeholder at `placeholder` in `before` through a host edit that produced
/// `after`.
///
/// The edit is located with a common prefix/suffix scan. Returns `None` if the edit removed or
/// replaced the placeholder.
pub fn track_placeholder(before: &str, placeholder: Option<usize>, after: &str) -> Option<usize> {
    let at = placeholder?;
    let old_len = utf16_len(before);
    let new_len = utf16_len(after);

    let prefix: usize = before
        .chars()
        .zip(after.chars())
        .take_while(|(a, b)| a == b)
        .map(|(ch, _)| ch.len_utf16())
        .sum();
    if at < prefix {
        return Some(at);
    }

    let room = old_len.min(new_len) - prefix;
    let mut suffix = 0;
    for (a, b) in before.chars().rev().zip(after.chars().rev()) {
        if a != b || suffix + a.len_utf16() > room {
            break;
        }
        suffix += a.len_utf16();
    }
    if at >= old_len - suffix {
        (at + new_len).checked_sub(old_len)
    } else {
        None
    }
}
