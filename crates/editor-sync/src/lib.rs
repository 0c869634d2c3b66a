#![warn(missing_docs)]
//! Editor Sync - windowed document synchronization for editing surfaces
//!
//! # Overview
//!
//! `editor-sync` keeps a host's editable text surface consistent with an authoritative document
//! that lives behind an asynchronous backend. Documents may be a few lines or hundreds of
//! thousands of lines long; large ones are edited through a window of lines around the
//! viewport, and every settled edit ships only a minimal delta.
//!
//! The crate is headless and single-threaded: it never spawns threads or timers. Backend calls
//! are ticketed submissions whose responses the host feeds back in any order, and time is
//! passed in explicitly.
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Editor / DocumentSession                   │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Selection, pairs, tab snapshots            │  ← Caret fidelity
//! ├─────────────────────────────────────────────┤
//! │  SyncEngine (debounce, commit, reconcile)   │  ← Edits out
//! ├─────────────────────────────────────────────┤
//! │  SegmentCache (window, fetch versions)      │  ← Text in
//! ├─────────────────────────────────────────────┤
//! │  Diff builder, coordinate mapper            │  ← Pure functions
//! ├─────────────────────────────────────────────┤
//! │  DocumentBackend contract                   │  ← Authoritative store
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use editor_sync::{
//!     DocumentId, Editor, EditSurface, MemoryDocuments, QueuedBackend, SyncOptions, TextSurface,
//! };
//! use std::time::{Duration, Instant};
//!
//! let id = DocumentId::new("notes.txt");
//! let mut docs = MemoryDocuments::new();
//! docs.insert(id.clone(), "alpha\nbeta\ngamma");
//!
//! let mut editor = Editor::new(QueuedBackend::new(), TextSurface::new(), SyncOptions::default());
//! editor.open(id.clone(), 3).unwrap();
//!
//! // The host delivers backend replies whenever they arrive.
//! for response in editor.backend_mut().drain_with(&mut docs) {
//!     editor.handle_response(response);
//! }
//! assert_eq!(editor.surface().text(), "alpha\nbeta\ngamma");
//!
//! // Type, let the debounce elapse, deliver the commit.
//! let t0 = Instant::now();
//! editor.surface_mut().move_caret(6);
//! editor.surface_mut().type_text("X");
//! editor.on_text_changed(t0).unwrap();
//! editor.tick(t0 + Duration::from_millis(500));
//! for response in editor.backend_mut().drain_with(&mut docs) {
//!     editor.handle_response(response);
//! }
//! assert_eq!(docs.text(&id).unwrap(), "alpha\nXbeta\ngamma");
//! ```
//!
//! # Module Description
//!
//! - [`coords`] - offset / scalar / line-column / display coordinate mapping
//! - [`diff`] - minimal single-region diffs
//! - [`backend`] - backend contract, in-memory and queued backends
//! - [`segment`] - windowed segment cache
//! - [`sync`] - debounced commit engine
//! - [`selection`] - caret, vertical and rectangular selection
//! - [`pairs`] - bracket and quote pair highlighting
//! - [`tabs`] - per-document snapshots
//! - [`editor`] - the orchestrator
//! - [`events`] - change notifications
//! - [`options`] - tunables

pub mod backend;
pub mod coords;
pub mod diff;
pub mod editor;
pub mod error;
pub mod events;
pub mod options;
pub mod pairs;
pub mod segment;
pub mod selection;
pub mod surface;
pub mod sync;
pub mod tabs;
pub mod timer;

pub use backend::memory::MemoryDocuments;
pub use backend::queued::{QueuedBackend, QueuedRequest};
pub use backend::{
    BackendMessage, BackendNotification, BackendReply, BackendRequest, BackendResponse,
    DocumentBackend, DocumentId, Ticket, TicketKind, WHOLE_DOCUMENT,
};
pub use coords::{DISPLAY_PLACEHOLDER, LineColumn};
pub use diff::{TextDiff, apply_diff, build_diff};
pub use editor::{DocumentHandle, DocumentMode, DocumentSession, Editor};
pub use error::{BackendError, EditorError};
pub use events::{EventBus, SyncEvent};
pub use options::SyncOptions;
pub use pairs::PairHighlight;
pub use segment::{FetchOutcome, FetchState, Segment, SegmentCache};
pub use selection::{Caret, RectBounds, RectSelection, VerticalDirection, VerticalSelection};
pub use surface::{EditSurface, SurfaceSelection, TextSurface};
pub use sync::{PendingEdit, SyncEngine};
pub use tabs::{TabSnapshot, TabSnapshots};
pub use timer::Deadline;
