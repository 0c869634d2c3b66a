//! Host edit-surface adapter.
//!
//! The engine manipulates the host's editable text area only through [`EditSurface`]. All
//! offsets are UTF-16 code units into the *display* text (see [`crate::coords`]).

use crate::coords::{code_unit_to_byte, utf16_len};

/// Anchor/focus pair in display offsets. `focus` is where the caret is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceSelection {
    /// Fixed end of the selection.
    pub anchor: usize,
    /// Moving end of the selection (the caret).
    pub focus: usize,
}

impl SurfaceSelection {
    /// A selection from `anchor` to `focus`.
    pub fn new(anchor: usize, focus: usize) -> Self {
        Self { anchor, focus }
    }

    /// A collapsed selection (plain caret).
    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    /// Returns `true` if anchor and focus coincide.
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Smaller end.
    pub fn start(&self) -> usize {
        self.anchor.min(self.focus)
    }

    /// Larger end.
    pub fn end(&self) -> usize {
        self.anchor.max(self.focus)
    }
}

/// The host's editable text area.
pub trait EditSurface {
    /// Current display text.
    fn text(&self) -> String;
    /// Replace the display text. Implementations clamp the selection to the new text.
    fn set_text(&mut self, text: &str);
    /// Current selection.
    fn selection(&self) -> SurfaceSelection;
    /// Set the selection (clamped to the text).
    fn set_selection(&mut self, anchor: usize, focus: usize);
    /// Scroll position (first visible row).
    fn scroll(&self) -> usize;
    /// Restore a scroll position.
    fn set_scroll(&mut self, top_row: usize);
}

/// In-memory [`EditSurface`], used by headless hosts and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextSurface {
    text: String,
    selection: SurfaceSelection,
    scroll: usize,
}

impl TextSurface {
    /// An empty surface.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection with `input` and collapse the caret after it, like typing.
    pub fn type_text(&mut self, input: &str) {
        let start = code_unit_to_byte(&self.text, self.selection.start());
        let end = code_unit_to_byte(&self.text, self.selection.end());
        self.text.replace_range(start..end, input);
        let caret = self.selection.start() + utf16_len(input);
        self.selection = SurfaceSelection::caret(caret);
    }

    /// Delete the selection, or the scalar before a collapsed caret.
    pub fn backspace(&mut self) {
        if self.selection.is_collapsed() {
            let caret = code_unit_to_byte(&self.text, self.selection.focus);
            let Some(prev) = self.text[..caret].chars().next_back() else {
                return;
            };
            let start = caret - prev.len_utf8();
            self.text.replace_range(start..caret, "");
            let focus = self.selection.focus - prev.len_utf16();
            self.selection = SurfaceSelection::caret(focus);
        } else {
            self.type_text("");
        }
    }

    /// Move the caret to `offset` (collapsing the selection).
    pub fn move_caret(&mut self, offset: usize) {
        self.set_selection(offset, offset);
    }
}

impl EditSurface for TextSurface {
    fn text(&self) -> String {
        self.text.clone()
    }

    fn set_text(&mut self, text: &str) {
        self.text = text.to_string();
        let len = utf16_len(&self.text);
        self.selection =
            SurfaceSelection::new(self.selection.anchor.min(len), self.selection.focus.min(len));
    }

    fn selection(&self) -> SurfaceSelection {
        self.selection
    }

    fn set_selection(&mut self, anchor: usize, focus: usize) {
        let len = utf16_len(&self.text);
        self.selection = SurfaceSelection::new(anchor.min(len), focus.min(len));
    }

    fn scroll(&self) -> usize {
        self.scroll
    }

    fn set_scroll(&mut self, top_row: usize) {
        self.scroll = top_row;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typing_and_backspace_track_utf16() {
        let mut surface = TextSurface::new();
        surface.type_text("a😀");
        assert_eq!(surface.selection(), SurfaceSelection::caret(3));
        surface.backspace();
        assert_eq!(surface.text(), "a");
        assert_eq!(surface.selection(), SurfaceSelection::caret(1));
    }

    #[test]
    fn test_set_text_clamps_selection() {
        let mut surface = TextSurface::new();
        surface.set_text("hello");
        surface.set_selection(1, 5);
        surface.set_text("hi");
        assert_eq!(surface.selection(), SurfaceSelection::new(1, 2));
    }
}
