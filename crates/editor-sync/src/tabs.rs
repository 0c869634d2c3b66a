//! Per-document surface snapshots for tab switching.

use crate::backend::DocumentId;
use crate::coords::{
    display_to_text_offset, from_display_text, text_to_display_offset, to_display_text,
};
use crate::segment::Segment;
use crate::selection::Caret;
use crate::surface::{EditSurface, SurfaceSelection};
use std::collections::HashMap;
use std::ops::Range;

/// What the surface looked like when the user left a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabSnapshot {
    /// Materialized segment, including any local edits.
    pub segment: Segment,
    /// Scroll position.
    pub scroll: usize,
    /// Selection in document-text offsets of the segment.
    pub selection: SurfaceSelection,
    /// Caret derived from the selection focus.
    pub caret: Caret,
}

impl TabSnapshot {
    /// Capture the surface state of a document whose segment starts at `start_line`.
    ///
    /// `placeholder` is the display offset of the placeholder unit on the surface, if any.
    pub fn from_surface<S: EditSurface + ?Sized>(
        surface: &S,
        placeholder: Option<usize>,
        start_line: usize,
    ) -> Self {
        let display = surface.text();
        let text = from_display_text(&display, placeholder);
        let raw = surface.selection();
        let selection = SurfaceSelection::new(
            display_to_text_offset(&display, placeholder, raw.anchor),
            display_to_text_offset(&display, placeholder, raw.focus),
        );
        let caret = Caret::from_offset(&text, selection.focus, start_line);
        Self {
            segment: Segment::new(start_line, text),
            scroll: surface.scroll(),
            selection,
            caret,
        }
    }

    /// Put the snapshot back on `surface`.
    pub fn apply_to_surface<S: EditSurface + ?Sized>(&self, surface: &mut S) {
        let text = &self.segment.text;
        surface.set_text(&to_display_text(text));
        surface.set_selection(
            text_to_display_offset(text, self.selection.anchor),
            text_to_display_offset(text, self.selection.focus),
        );
        surface.set_scroll(self.scroll);
    }
}

/// Snapshots and remembered carets keyed by document.
#[derive(Debug, Default, Clone)]
pub struct TabSnapshots {
    snapshots: HashMap<DocumentId, TabSnapshot>,
    carets: HashMap<DocumentId, Caret>,
}

impl TabSnapshots {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `surface` for `id`, remembering its caret too.
    pub fn capture<S: EditSurface + ?Sized>(
        &mut self,
        id: &DocumentId,
        surface: &S,
        placeholder: Option<usize>,
        start_line: usize,
    ) -> &TabSnapshot {
        let snapshot = TabSnapshot::from_surface(surface, placeholder, start_line);
        self.carets.insert(id.clone(), snapshot.caret);
        self.snapshots.insert(id.clone(), snapshot);
        &self.snapshots[id]
    }

    /// Snapshot for `id`, if captured.
    pub fn get(&self, id: &DocumentId) -> Option<&TabSnapshot> {
        self.snapshots.get(id)
    }

    /// Mutable snapshot for `id`.
    pub fn get_mut(&mut self, id: &DocumentId) -> Option<&mut TabSnapshot> {
        self.snapshots.get_mut(id)
    }

    /// Restore the snapshot of `id` onto `surface`. Returns it if one existed.
    pub fn restore<S: EditSurface + ?Sized>(
        &self,
        id: &DocumentId,
        surface: &mut S,
    ) -> Option<&TabSnapshot> {
        let snapshot = self.snapshots.get(id)?;
        snapshot.apply_to_surface(surface);
        Some(snapshot)
    }

    /// Last caret seen for `id`.
    pub fn saved_caret(&self, id: &DocumentId) -> Option<Caret> {
        self.carets.get(id).copied()
    }

    /// Remember a caret for `id` without a full snapshot. It wins over the snapshot's own
    /// caret on the next restore.
    pub fn remember_caret(&mut self, id: &DocumentId, caret: Caret) {
        self.carets.insert(id.clone(), caret);
    }

    /// Drop the snapshot of `id` but keep its remembered caret.
    pub fn discard_snapshot(&mut self, id: &DocumentId) {
        self.snapshots.remove(id);
    }

    /// Number of snapshots held.
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// Returns `true` if no snapshot is held.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

/// Visible range of `rows` lines with `caret` roughly a third from the top.
pub fn anchor_around(caret: Caret, rows: usize) -> Range<usize> {
    let rows = rows.max(1);
    let start = caret.line_index().saturating_sub(rows / 3);
    start..start + rows
}
