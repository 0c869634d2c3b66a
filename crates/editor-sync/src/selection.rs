//! Caret, vertical and rectangular selection helpers.
//!
//! Everything here works on the document text of a segment plus the segment's first line, so
//! carets are always reported in whole-document coordinates regardless of the window.

use crate::coords::{code_unit_to_byte, line_column_to_offset, offset_to_line_column, utf16_len};

/// Caret position: 1-based line, 1-based column (UTF-16 code units).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Caret {
    /// 1-based document line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
}

impl Caret {
    /// Create a caret.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Caret at `offset` inside segment text `text` whose first line is `start_line` (0-based).
    pub fn from_offset(text: &str, offset: usize, start_line: usize) -> Self {
        let lc = offset_to_line_column(text, offset);
        Self::new(start_line + lc.line, lc.column + 1)
    }

    /// Offset of this caret inside segment text `text` whose first line is `start_line`.
    ///
    /// Lines before the segment map to its start; lines after it to its end.
    pub fn to_offset(&self, text: &str, start_line: usize) -> usize {
        if self.line <= start_line {
            return 0;
        }
        line_column_to_offset(text, self.line - start_line, self.column.saturating_sub(1))
    }

    /// 0-based document line.
    pub fn line_index(&self) -> usize {
        self.line.saturating_sub(1)
    }
}

/// Direction of a vertical extension step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalDirection {
    /// One line up.
    Up,
    /// One line down.
    Down,
}

/// Vertical block selection started with a modifier + Up/Down gesture.
///
/// Each extension produces a single linear selection from `(min_line, base_column)` to
/// `(max_line, base_column)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerticalSelection {
    /// Line where the gesture started (1-based).
    pub base_line: usize,
    /// Column where the gesture started (0-based code units).
    pub base_column: usize,
    /// Line the gesture extended to (1-based).
    pub focus_line: usize,
}

impl VerticalSelection {
    /// Start a vertical selection at `caret`.
    pub fn new(caret: Caret) -> Self {
        Self {
            base_line: caret.line.max(1),
            base_column: caret.column.saturating_sub(1),
            focus_line: caret.line.max(1),
        }
    }

    /// Move the focus one line, staying within `first_line..=last_line` (1-based).
    pub fn extend(&mut self, direction: VerticalDirection, first_line: usize, last_line: usize) {
        self.focus_line = match direction {
            VerticalDirection::Up => self.focus_line.saturating_sub(1),
            VerticalDirection::Down => self.focus_line + 1,
        }
        .clamp(first_line.max(1), last_line.max(first_line).max(1));
    }

    /// Linear `(start, end)` offsets inside segment text `text` starting at `start_line`.
    pub fn linear_range(&self, text: &str, start_line: usize) -> (usize, usize) {
        let top = self.base_line.min(self.focus_line);
        let bottom = self.base_line.max(self.focus_line);
        let column = self.base_column + 1;
        let start = Caret::new(top, column).to_offset(text, start_line);
        let end = Caret::new(bottom, column).to_offset(text, start_line);
        (start, end)
    }
}

/// A rectangular selection between two carets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectSelection {
    /// Line where the drag started.
    pub anchor_line: usize,
    /// Column where the drag started.
    pub anchor_column: usize,
    /// Line under the pointer.
    pub focus_line: usize,
    /// Column under the pointer.
    pub focus_column: usize,
}

/// Normalized bounds of a [`RectSelection`]. Lines are inclusive, columns are 1-based with an
/// exclusive `end_column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectBounds {
    /// Top line.
    pub start_line: usize,
    /// Bottom line (inclusive).
    pub end_line: usize,
    /// Left column.
    pub start_column: usize,
    /// Right column (exclusive).
    pub end_column: usize,
    /// `end_column - start_column`.
    pub width: usize,
    /// `end_line - start_line + 1`.
    pub line_count: usize,
}

impl RectSelection {
    /// Rectangle from `anchor` to `focus`.
    pub fn new(anchor: Caret, focus: Caret) -> Self {
        Self {
            anchor_line: anchor.line,
            anchor_column: anchor.column,
            focus_line: focus.line,
            focus_column: focus.column,
        }
    }

    /// Move the focus corner.
    pub fn set_focus(&mut self, focus: Caret) {
        self.focus_line = focus.line;
        self.focus_column = focus.column;
    }

    /// Normalize so that starts are never after ends.
    pub fn normalized(&self) -> RectBounds {
        let start_line = self.anchor_line.min(self.focus_line);
        let end_line = self.anchor_line.max(self.focus_line);
        let start_column = self.anchor_column.min(self.focus_column);
        let end_column = self.anchor_column.max(self.focus_column);
        RectBounds {
            start_line,
            end_line,
            start_column,
            end_column,
            width: end_column - start_column,
            line_count: end_line - start_line + 1,
        }
    }
}

/// The part of one line covered by a rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RectSlice {
    /// 1-based document line.
    pub line: usize,
    /// 0-based start column, clamped to the line.
    pub start: usize,
    /// 0-based exclusive end column, clamped to the line.
    pub end: usize,
    /// Covered text.
    pub text: String,
}

fn segment_lines(text: &str) -> Vec<String> {
    text.split('\n').map(str::to_string).collect()
}

fn utf16_slice(line: &str, start: usize, end: usize) -> &str {
    let start = code_unit_to_byte(line, start);
    let end = code_unit_to_byte(line, end).max(start);
    &line[start..end]
}

fn pad_to(line: &mut String, column: usize) {
    let len = utf16_len(line);
    if len < column {
        line.extend(std::iter::repeat_n(' ', column - len));
    }
}

/// Per-line slices of `bounds` within segment text `text` starting at `start_line` (0-based).
///
/// Lines outside the segment are skipped.
pub fn rect_slices(text: &str, start_line: usize, bounds: &RectBounds) -> Vec<RectSlice> {
    let lines = segment_lines(text);
    (bounds.start_line..=bounds.end_line)
        .filter_map(|line| {
            let local = line.checked_sub(start_line + 1)?;
            let content = lines.get(local)?;
            let len = utf16_len(content);
            let start = bounds.start_column.saturating_sub(1).min(len);
            let end = bounds.end_column.saturating_sub(1).min(len).max(start);
            Some(RectSlice {
                line,
                start,
                end,
                text: utf16_slice(content, start, end).to_string(),
            })
        })
        .collect()
}

/// Text of a block copy: one row per line, joined with `'\n'`.
pub fn rect_copy(text: &str, start_line: usize, bounds: &RectBounds) -> String {
    rect_slices(text, start_line, bounds)
        .into_iter()
        .map(|slice| slice.text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the rectangle's columns on every covered line with `replacement`.
///
/// Lines shorter than the rectangle's left edge are padded with spaces first, so typed text
/// lines up in one column.
pub fn rect_replace(text: &str, start_line: usize, bounds: &RectBounds, replacement: &str) -> String {
    let mut lines = segment_lines(text);
    let left = bounds.start_column.saturating_sub(1);
    let right = bounds.end_column.saturating_sub(1);
    for line in bounds.start_line..=bounds.end_line {
        let Some(local) = line.checked_sub(start_line + 1) else {
            continue;
        };
        let Some(content) = lines.get_mut(local) else {
            continue;
        };
        pad_to(content, left);
        let start = code_unit_to_byte(content, left);
        let end = code_unit_to_byte(content, right).max(start);
        content.replace_range(start..end, replacement);
    }
    lines.join("\n")
}

/// Insert `rows` as a block with its top-left corner at (`line`, `column`), both 1-based.
///
/// Rows are padded with spaces to the widest row so the block stays rectangular; short target
/// lines are padded up to `column`. Rows past the end of the text become new lines when
/// `allow_append` is set and are dropped otherwise.
pub fn rect_insert(
    text: &str,
    start_line: usize,
    line: usize,
    column: usize,
    rows: &[&str],
    allow_append: bool,
) -> String {
    let width = rows.iter().map(|row| utf16_len(row)).max().unwrap_or(0);
    let left = column.saturating_sub(1);
    let mut lines = segment_lines(text);
    let first = line.saturating_sub(start_line + 1);
    for (i, row) in rows.iter().enumerate() {
        let local = first + i;
        if local >= lines.len() {
            if !allow_append {
                break;
            }
            lines.push(String::new());
        }
        let mut block = (*row).to_string();
        pad_to(&mut block, width);
        let content = &mut lines[local];
        pad_to(content, left);
        let at = code_unit_to_byte(content, left);
        content.insert_str(at, &block);
    }
    lines.join("\n")
}

/// Rows to scroll while dragging a rectangle with the pointer on `pointer_row` of a viewport
/// `viewport_rows` tall. Negative scrolls up. Zero inside the non-edge area.
pub fn autoscroll_step(pointer_row: isize, viewport_rows: usize, edge_rows: usize) -> isize {
    let rows = viewport_rows as isize;
    let edge = edge_rows as isize;
    if pointer_row < edge {
        pointer_row - edge
    } else if pointer_row >= rows - edge {
        pointer_row - (rows - edge) + 1
    } else {
        0
    }
}
