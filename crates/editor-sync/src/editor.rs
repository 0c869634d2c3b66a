//! The per-surface orchestrator.
//!
//! [`Editor`] owns one [`DocumentSession`] per open document, the host [`EditSurface`], the
//! [`DocumentBackend`], the [`EventBus`] and the tab snapshots. Hosts drive it with three kinds
//! of input:
//!
//! - surface callbacks: [`Editor::on_text_changed`], [`Editor::on_selection_changed`],
//!   [`Editor::on_viewport_changed`], composition start/end
//! - time: [`Editor::tick`] with the current [`Instant`] (see [`Editor::next_deadline`])
//! - backend traffic: [`Editor::handle_message`] for every response and notification, in
//!   whatever order the backend produces them
//!
//! Responses are routed by the document in their [`Ticket`], so a late reply for a
//! background tab updates that tab's session and never the visible one.

use crate::backend::{
    BackendError, BackendMessage, BackendNotification, BackendReply, BackendRequest,
    BackendResponse, DocumentBackend, DocumentId, Ticket, TicketKind,
};
use crate::coords::{
    display_to_text_offset, from_display_text, line_count, placeholder_offset,
    text_to_display_offset, to_display_text, track_placeholder, utf16_len,
};
use crate::error::EditorError;
use crate::events::{EventBus, SyncEvent};
use crate::options::SyncOptions;
use crate::pairs::{PairHighlight, pair_highlight};
use crate::segment::{FetchOutcome, FetchPlan, Segment, SegmentCache};
use crate::selection::{
    Caret, RectBounds, RectSelection, RectSlice, VerticalDirection, VerticalSelection,
    autoscroll_step, rect_copy, rect_insert, rect_replace, rect_slices,
};
use crate::surface::{EditSurface, SurfaceSelection};
use crate::sync::{CommitOutcome, CommitTarget, ExternalChange, FlushOutcome, SyncEngine};
use crate::tabs::{TabSnapshots, anchor_around};
use crate::timer::Deadline;
use crossbeam_channel::Receiver;
use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;
use tracing::{debug, info, warn};

const DEFAULT_VIEWPORT_ROWS: usize = 50;

/// Opaque document id plus its authoritative line count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHandle {
    /// Backend id.
    pub id: DocumentId,
    /// Total lines as last reported by the backend.
    pub total_lines: usize,
}

/// How much of a document is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentMode {
    /// The whole text lives on the surface; commits are scalar point edits.
    Full,
    /// Only a window of lines lives on the surface; commits are line-range replaces.
    Windowed,
}

/// Everything the editor knows about one open document.
#[derive(Debug)]
pub struct DocumentSession {
    id: DocumentId,
    mode: DocumentMode,
    cache: SegmentCache,
    sync: SyncEngine,
    unlock: Deadline,
    probe_version: u64,
    pending_caret: Option<Caret>,
    loaded: bool,
    closing: bool,
}

impl DocumentSession {
    /// Create a session; the mode is fixed from `total_lines` at open time.
    pub fn new(id: DocumentId, total_lines: usize, options: &SyncOptions) -> Self {
        let windowed = options.is_huge(total_lines);
        let (mode, buffer) = if windowed {
            (DocumentMode::Windowed, options.huge_window_buffer_lines)
        } else {
            (DocumentMode::Full, 0)
        };
        Self {
            cache: SegmentCache::new(windowed, buffer, total_lines),
            sync: SyncEngine::new(id.clone(), options.debounce_for(windowed)),
            id,
            mode,
            unlock: Deadline::new(),
            probe_version: 0,
            pending_caret: None,
            loaded: false,
            closing: false,
        }
    }

    /// Document id.
    pub fn id(&self) -> &DocumentId {
        &self.id
    }

    /// Id and authoritative line count.
    pub fn handle(&self) -> DocumentHandle {
        DocumentHandle {
            id: self.id.clone(),
            total_lines: self.cache.total_lines(),
        }
    }

    /// Materialization mode.
    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    /// Returns `true` in windowed mode.
    pub fn is_windowed(&self) -> bool {
        self.mode == DocumentMode::Windowed
    }

    /// Current segment, once the first fetch has been applied.
    pub fn segment(&self) -> Option<&Segment> {
        self.cache.segment()
    }

    /// First document line of the segment (0 before the first fetch).
    pub fn start_line(&self) -> usize {
        self.cache.segment().map_or(0, |segment| segment.start_line)
    }

    /// Authoritative line count.
    pub fn total_lines(&self) -> usize {
        self.cache.total_lines()
    }

    /// Segment cache state.
    pub fn cache(&self) -> &SegmentCache {
        &self.cache
    }

    /// Commit engine state.
    pub fn sync(&self) -> &SyncEngine {
        &self.sync
    }

    /// Unsaved-changes flag.
    pub fn is_dirty(&self) -> bool {
        self.sync.is_dirty()
    }

    /// Returns `true` once content has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns `true` if the document was closed but a commit is still settling.
    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// Earliest armed timer of this session.
    pub fn next_deadline(&self) -> Option<Instant> {
        [self.sync.debounce_deadline(), self.unlock.at()]
            .into_iter()
            .flatten()
            .min()
    }

    fn commit_target(&self) -> CommitTarget {
        match self.mode {
            DocumentMode::Full => CommitTarget::Document,
            DocumentMode::Windowed => CommitTarget::Lines {
                start_line: self.start_line(),
            },
        }
    }

    fn cancel_timers(&mut self) {
        self.sync.cancel_timers();
        self.unlock.cancel();
    }
}

fn submit_fetch<B: DocumentBackend + ?Sized>(
    backend: &mut B,
    id: &DocumentId,
    cache: &mut SegmentCache,
    plan: Option<FetchPlan>,
) {
    let Some(plan) = plan else {
        return;
    };
    let request = if plan.whole_document {
        BackendRequest::ReadRange {
            id: id.clone(),
            start_line: plan.lines.start,
            end_line: plan.lines.end,
        }
    } else {
        BackendRequest::ReadChunk {
            id: id.clone(),
            start_line: plan.lines.start,
            end_line: plan.lines.end,
        }
    };
    let ticket = Ticket::new(id.clone(), TicketKind::Fetch, plan.version);
    if let Err(err) = backend.submit(ticket, request) {
        warn!(document = %id, version = plan.version, error = %err, "fetch submission failed");
        cache.abandon(plan.version);
    }
}

fn token_range(cache: &SegmentCache, margin: usize) -> Range<usize> {
    let visible = cache.visible();
    let total = cache.total_lines();
    let start = visible.start.saturating_sub(margin).min(total);
    let end = visible.end.saturating_add(margin).min(total).max(start);
    start..end
}

/// Windowed-document editing surface bound to a backend.
pub struct Editor<B: DocumentBackend, S: EditSurface> {
    backend: B,
    surface: S,
    options: SyncOptions,
    sessions: HashMap<DocumentId, DocumentSession>,
    active: Option<DocumentId>,
    tabs: TabSnapshots,
    events: EventBus,
    viewport_rows: usize,
    vertical: Option<VerticalSelection>,
    rect: Option<RectSelection>,
    rect_dragging: bool,
    pair: Option<PairHighlight>,
    last_selection: Option<SurfaceSelection>,
    shown: String,
    placeholder: Option<usize>,
}

impl<B: DocumentBackend, S: EditSurface> Editor<B, S> {
    /// Create an editor with no open documents.
    pub fn new(backend: B, surface: S, options: SyncOptions) -> Self {
        Self {
            backend,
            surface,
            options,
            sessions: HashMap::new(),
            active: None,
            tabs: TabSnapshots::new(),
            events: EventBus::new(),
            viewport_rows: DEFAULT_VIEWPORT_ROWS,
            vertical: None,
            rect: None,
            rect_dragging: false,
            pair: None,
            last_selection: None,
            shown: String::new(),
            placeholder: None,
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Borrow the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutably borrow the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Borrow the surface.
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Mutably borrow the surface. Report changes through the `on_*` callbacks.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Subscribe to [`SyncEvent`]s.
    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Document shown on the surface.
    pub fn active_document(&self) -> Option<&DocumentId> {
        self.active.as_ref()
    }

    /// Session of an open (or still settling) document.
    pub fn session(&self, id: &DocumentId) -> Option<&DocumentSession> {
        self.sessions.get(id)
    }

    /// Returns `true` if `id` is open.
    pub fn is_open(&self, id: &DocumentId) -> bool {
        self.sessions.get(id).is_some_and(|session| !session.closing)
    }

    /// Unsaved-changes flag of `id`.
    pub fn is_dirty(&self, id: &DocumentId) -> bool {
        self.sessions.get(id).is_some_and(DocumentSession::is_dirty)
    }

    /// Tab snapshots and remembered carets.
    pub fn tabs(&self) -> &TabSnapshots {
        &self.tabs
    }

    /// Remember where `id` should land the next time it becomes active, such as a search hit
    /// in a background tab. The active document's caret is captured when it is left, so the
    /// call is ignored for it.
    pub fn remember_caret(&mut self, id: &DocumentId, caret: Caret) {
        if self.is_active(id) {
            debug!(document = %id, "caret of the active document is not remembered");
            return;
        }
        self.tabs.remember_caret(id, caret);
    }

    /// Earliest timer across all sessions; call [`Editor::tick`] no later than this.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions
            .values()
            .filter_map(DocumentSession::next_deadline)
            .min()
    }

    fn active_id(&self) -> Result<DocumentId, EditorError> {
        self.active.clone().ok_or(EditorError::NoActiveDocument)
    }

    fn is_active(&self, id: &DocumentId) -> bool {
        self.active.as_ref() == Some(id)
    }

    fn current_text(&self, id: &DocumentId) -> Option<String> {
        if self.is_active(id) {
            Some(self.surface_text())
        } else {
            self.tabs.get(id).map(|snapshot| snapshot.segment.text.clone())
        }
    }

    /// Document text on the surface, without the placeholder.
    fn surface_text(&self) -> String {
        from_display_text(&self.surface.text(), self.placeholder)
    }

    /// Put document text on the surface, adding the placeholder it needs.
    fn show_text(&mut self, text: &str) {
        let display = to_display_text(text);
        self.surface.set_text(&display);
        self.placeholder = placeholder_offset(text);
        self.shown = display;
    }

    fn selection_carets(&self, start_line: usize) -> (Caret, Caret) {
        let display = self.surface.text();
        let text = from_display_text(&display, self.placeholder);
        let selection = self.surface.selection();
        let anchor = display_to_text_offset(&display, self.placeholder, selection.anchor);
        let focus = display_to_text_offset(&display, self.placeholder, selection.focus);
        (
            Caret::from_offset(&text, anchor, start_line),
            Caret::from_offset(&text, focus, start_line),
        )
    }

    // ---------------------------------------------------------------------
    // Document lifecycle
    // ---------------------------------------------------------------------

    /// Open `id` (or switch to it if already open) and make it active.
    pub fn open(&mut self, id: DocumentId, total_lines: usize) -> Result<(), EditorError> {
        match self.sessions.get_mut(&id) {
            Some(session) => session.closing = false,
            None => {
                let session = DocumentSession::new(id.clone(), total_lines, &self.options);
                info!(document = %id, total_lines, mode = ?session.mode, "document opened");
                self.sessions.insert(id.clone(), session);
            }
        }
        self.switch_to(&id)
    }

    /// Make `id` the active document.
    ///
    /// The current document is flushed and snapshotted; a snapshot of `id` is restored without
    /// waiting for the backend and then re-validated with a line-count probe.
    pub fn switch_to(&mut self, id: &DocumentId) -> Result<(), EditorError> {
        if !self.is_open(id) {
            return Err(EditorError::DocumentNotOpen(id.clone()));
        }
        if self.is_active(id) {
            return Ok(());
        }
        self.leave_active();
        self.active = Some(id.clone());
        self.enter(id);
        Ok(())
    }

    /// Close `id`. Unsent edits are flushed first; the session lingers until its last commit
    /// settles.
    pub fn close(&mut self, id: &DocumentId) -> Result<(), EditorError> {
        if !self.is_open(id) {
            return Err(EditorError::DocumentNotOpen(id.clone()));
        }
        if self.is_active(id) {
            self.leave_active();
            self.show_text("");
            self.surface.set_selection(0, 0);
            self.last_selection = Some(self.surface.selection());
        } else {
            self.flush_document(id);
        }

        let Some(session) = self.sessions.get_mut(id) else {
            return Ok(());
        };
        session.cancel_timers();
        if session.sync.is_in_flight() {
            debug!(document = %id, "close waits for in-flight commit");
            session.closing = true;
        } else {
            self.finish_close(id);
        }
        Ok(())
    }

    fn finish_close(&mut self, id: &DocumentId) {
        self.sessions.remove(id);
        self.tabs.discard_snapshot(id);
        info!(document = %id, "document closed");
    }

    fn leave_active(&mut self) {
        let Some(id) = self.active.take() else {
            return;
        };
        self.clear_block_selection();
        self.pair = None;

        let start_line = self.sessions.get(&id).map_or(0, DocumentSession::start_line);
        self.tabs
            .capture(&id, &self.surface, self.placeholder, start_line);
        if let Some(session) = self.sessions.get_mut(&id) {
            session.cancel_timers();
            session.sync.cancel_composition();
            session.cache.cancel_composition();
        }
        // `active` is already cleared, so the flush reads the snapshot text.
        self.flush_document(&id);
        debug!(document = %id, "left document");
    }

    fn enter(&mut self, id: &DocumentId) {
        let rows = self.viewport_rows;
        let saved_caret = self.tabs.saved_caret(id);
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };

        let restored = match self.tabs.restore(id, &mut self.surface) {
            Some(snapshot) => {
                let segment = snapshot.segment.clone();
                self.placeholder = placeholder_offset(&segment.text);
                self.shown = self.surface.text();
                let caret = saved_caret.unwrap_or(snapshot.caret);
                let visible = if segment.contains_line(caret.line_index()) {
                    if caret != snapshot.caret {
                        let offset = text_to_display_offset(
                            &segment.text,
                            caret.to_offset(&segment.text, segment.start_line),
                        );
                        self.surface.set_selection(offset, offset);
                    }
                    let top = segment.start_line + snapshot.scroll;
                    top..top + rows
                } else {
                    debug!(document = %id, line = caret.line, "caret outside restored segment");
                    session.pending_caret = Some(caret);
                    anchor_around(caret, rows)
                };
                debug!(document = %id, start_line = segment.start_line, "restored snapshot");
                session.cache.adopt(segment);
                let plan = session.cache.on_viewport(visible);
                submit_fetch(&mut self.backend, id, &mut session.cache, plan);
                true
            }
            None => {
                self.surface.set_text("");
                self.placeholder = None;
                self.shown.clear();
                self.surface.set_selection(0, 0);
                self.surface.set_scroll(0);
                session.pending_caret = saved_caret;
                let visible = saved_caret.map_or(0..rows, |caret| anchor_around(caret, rows));
                let plan = session.cache.on_viewport(visible);
                submit_fetch(&mut self.backend, id, &mut session.cache, plan);
                false
            }
        };
        self.last_selection = Some(self.surface.selection());
        self.pair = self.compute_pair(id);

        if restored {
            self.probe(id);
            let current = self.current_text(id).unwrap_or_default();
            let unsent = self.sessions.get(id).is_some_and(|session| {
                session.loaded
                    && !session.sync.is_in_flight()
                    && session.sync.has_local_changes(&current)
            });
            if unsent {
                self.flush_document(id);
            }
        }
    }

    fn probe(&mut self, id: &DocumentId) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        session.probe_version += 1;
        let ticket = Ticket::new(id.clone(), TicketKind::Probe, session.probe_version);
        let request = BackendRequest::LineCount { id: id.clone() };
        if let Err(err) = self.backend.submit(ticket, request) {
            warn!(document = %id, error = %err, "line count probe failed");
        }
    }

    // ---------------------------------------------------------------------
    // Surface callbacks
    // ---------------------------------------------------------------------

    /// The surface text changed by user input.
    pub fn on_text_changed(&mut self, now: Instant) -> Result<(), EditorError> {
        let id = self.active_id()?;
        self.normalize_placeholder();
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;
        session.sync.on_local_change(now);
        Ok(())
    }

    fn normalize_placeholder(&mut self) {
        let display = self.surface.text();
        let placeholder = track_placeholder(&self.shown, self.placeholder, &display);
        let text = from_display_text(&display, placeholder);
        let expected = to_display_text(&text);
        if display != expected {
            let selection = self.surface.selection();
            let anchor = display_to_text_offset(&display, placeholder, selection.anchor);
            let focus = display_to_text_offset(&display, placeholder, selection.focus);
            self.surface.set_text(&expected);
            self.surface.set_selection(
                text_to_display_offset(&text, anchor),
                text_to_display_offset(&text, focus),
            );
        }
        self.placeholder = placeholder_offset(&text);
        self.shown = expected;
    }

    /// The surface selection changed. Returns the pair highlight to draw.
    pub fn on_selection_changed(&mut self) -> Result<Option<PairHighlight>, EditorError> {
        let id = self.active_id()?;
        let selection = self.surface.selection();
        if self.last_selection != Some(selection) {
            self.vertical = None;
            if !self.rect_dragging {
                self.rect = None;
            }
            self.last_selection = Some(selection);
        }
        self.pair = self.compute_pair(&id);
        Ok(self.pair)
    }

    /// The visible document line range changed (0-based, half-open).
    pub fn on_viewport_changed(&mut self, visible: Range<usize>) -> Result<(), EditorError> {
        let id = self.active_id()?;
        self.viewport_rows = visible.len().max(1);
        let current = self.current_text(&id).unwrap_or_default();
        let session = self
            .sessions
            .get(&id)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;

        let leaves_segment = session
            .segment()
            .is_some_and(|segment| !segment.covers(&visible));
        let flush_first = session.is_windowed()
            && session.loaded
            && leaves_segment
            && !session.sync.is_in_flight()
            && !session.sync.is_composing()
            && session.sync.has_local_changes(&current);
        if flush_first {
            debug!(document = %id, "flushing before moving the window");
            self.flush_document(&id);
        }

        let Some(session) = self.sessions.get_mut(&id) else {
            return Ok(());
        };
        let plan = session.cache.on_viewport(visible);
        submit_fetch(&mut self.backend, &id, &mut session.cache, plan);
        Ok(())
    }

    /// Composition (IME) input started.
    pub fn composition_start(&mut self) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;
        session.sync.begin_composition();
        session.cache.begin_composition();
        session.unlock.cancel();
        debug!(document = %id, "composition started");
        Ok(())
    }

    /// Composition (IME) input ended at `now`.
    pub fn composition_end(&mut self, now: Instant) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let delay = self.options.ime_unlock_delay();
        self.normalize_placeholder();
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;
        session.sync.end_composition(now);
        session.cache.end_composition();
        session.unlock.schedule(now, delay);
        debug!(document = %id, "composition ended");
        Ok(())
    }

    /// Fire due timers.
    pub fn tick(&mut self, now: Instant) {
        let ids: Vec<DocumentId> = self.sessions.keys().cloned().collect();
        for id in ids {
            let flush_due = self
                .sessions
                .get_mut(&id)
                .is_some_and(|session| session.sync.tick(now));
            if flush_due {
                self.flush_document(&id);
            }

            if let Some(session) = self.sessions.get_mut(&id)
                && session.unlock.take_due(now)
            {
                debug!(document = %id, "composition unlock delay elapsed");
                let plan = session.cache.release_unlock();
                submit_fetch(&mut self.backend, &id, &mut session.cache, plan);
            }
            self.settle(&id);
        }
    }

    /// Commit the active document's local edits now, skipping the debounce.
    pub fn flush(&mut self) -> Result<(), EditorError> {
        let id = self.active_id()?;
        self.flush_document(&id);
        Ok(())
    }

    /// Re-fetch the active document (deferred while local edits are unsent).
    pub fn refresh(&mut self) -> Result<(), EditorError> {
        let id = self.active_id()?;
        let current = self.current_text(&id).unwrap_or_default();
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;
        if session.sync.is_composing() || session.sync.has_local_changes(&current) {
            session.sync.defer_reload();
            return Ok(());
        }
        self.reload(&id);
        Ok(())
    }

    /// Clear the unsaved-changes flag of `id` after the host saved it.
    pub fn mark_saved(&mut self, id: &DocumentId) -> Result<(), EditorError> {
        let session = self
            .sessions
            .get_mut(id)
            .filter(|session| !session.closing)
            .ok_or_else(|| EditorError::DocumentNotOpen(id.clone()))?;
        if session.sync.set_dirty(false) {
            self.events.publish(SyncEvent::DirtyChanged {
                document: id.clone(),
                dirty: false,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Backend traffic
    // ---------------------------------------------------------------------

    /// Deliver a backend message.
    pub fn handle_message(&mut self, message: BackendMessage) {
        match message {
            BackendMessage::Response(response) => self.handle_response(response),
            BackendMessage::Notification(notification) => self.handle_notification(notification),
        }
    }

    /// Deliver a response to an earlier submission.
    pub fn handle_response(&mut self, response: BackendResponse) {
        let BackendResponse { ticket, result } = response;
        if !self.sessions.contains_key(&ticket.document) {
            debug!(document = %ticket.document, kind = ?ticket.kind, "response for closed document dropped");
            return;
        }
        match ticket.kind {
            TicketKind::Fetch => self.finish_fetch(&ticket.document, ticket.version, result),
            TicketKind::Commit => self.finish_commit(&ticket.document, ticket.version, result),
            TicketKind::Probe => self.finish_probe(&ticket.document, ticket.version, result),
        }
    }

    /// Deliver a backend push notification.
    pub fn handle_notification(&mut self, notification: BackendNotification) {
        match notification {
            BackendNotification::LinesChanged { id, total_lines } => {
                let current = self.current_text(&id).unwrap_or_default();
                let Some(session) = self.sessions.get_mut(&id) else {
                    debug!(document = %id, "change notification for unknown document");
                    return;
                };
                session.cache.set_total_lines(total_lines);
                if session.sync.on_external_change(&current, total_lines) == ExternalChange::Reload
                {
                    self.reload(&id);
                }
            }
        }
    }

    fn flush_document(&mut self, id: &DocumentId) {
        let Some(current) = self.current_text(id) else {
            return;
        };
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if !session.loaded {
            return;
        }
        let target = session.commit_target();
        let FlushOutcome::Send(plan) = session.sync.flush(&current, target) else {
            return;
        };
        session.cache.lock_commit();
        let ticket = Ticket::new(id.clone(), TicketKind::Commit, plan.version);
        if let Err(err) = self.backend.submit(ticket, plan.request) {
            self.finish_commit(id, plan.version, Err(err));
        }
    }

    fn finish_fetch(
        &mut self,
        id: &DocumentId,
        version: u64,
        result: Result<BackendReply, BackendError>,
    ) {
        let active = self.is_active(id);
        let current = self.current_text(id).unwrap_or_default();
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let FetchOutcome::Ready(segment) = session.cache.apply(version, result) else {
            return;
        };
        if !active {
            debug!(document = %id, version, "fetch for background document deferred");
            session.cache.defer(true);
            return;
        }
        if session.loaded
            && (session.sync.is_composing() || session.sync.has_local_changes(&current))
        {
            debug!(document = %id, version, "fetch held back by local edits");
            session.cache.defer(true);
            return;
        }
        self.install_segment(id, segment);
    }

    fn install_segment(&mut self, id: &DocumentId, segment: Segment) {
        let start_line = self.sessions.get(id).map_or(0, DocumentSession::start_line);
        let carets = self.selection_carets(start_line);
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let (anchor, focus) = match session.pending_caret.take() {
            Some(caret) => (caret, caret),
            None => carets,
        };

        let lines = segment.lines();
        let display = to_display_text(&segment.text);
        self.placeholder = placeholder_offset(&segment.text);
        let anchor = text_to_display_offset(
            &segment.text,
            anchor.to_offset(&segment.text, segment.start_line),
        );
        let focus = text_to_display_offset(
            &segment.text,
            focus.to_offset(&segment.text, segment.start_line),
        );
        session.sync.set_base(segment.text.clone());
        session.loaded = true;
        session.cache.adopt(segment);

        let visible = session.cache.visible();
        if session.is_windowed() {
            self.surface
                .set_scroll(visible.start.saturating_sub(lines.start));
        }
        self.surface.set_text(&display);
        self.shown = display;
        self.surface.set_selection(anchor, focus);
        self.last_selection = Some(self.surface.selection());
        info!(
            document = %id,
            start_line = lines.start,
            end_line = lines.end,
            "segment applied"
        );

        // The viewport may have moved on while this fetch was travelling.
        let plan = if session.is_windowed() {
            session.cache.on_viewport(visible)
        } else {
            None
        };
        submit_fetch(&mut self.backend, id, &mut session.cache, plan);

        self.events.publish(SyncEvent::SegmentReplaced {
            document: id.clone(),
            lines: lines.clone(),
        });
        self.events.publish(SyncEvent::TokensStale {
            document: id.clone(),
            lines,
        });
        self.pair = self.compute_pair(id);
    }

    fn finish_commit(
        &mut self,
        id: &DocumentId,
        version: u64,
        result: Result<BackendReply, BackendError>,
    ) {
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let mut needs_probe = false;
        let reflush = match session.sync.on_commit_result(version, result) {
            CommitOutcome::Stale => return,
            CommitOutcome::Confirmed {
                total_lines,
                sent_text,
                start_line,
                dirty_changed,
                reflush,
            } => {
                let committed = Segment::new(start_line, sent_text);
                match total_lines {
                    Some(total) => session.cache.set_total_lines(total),
                    None if !session.is_windowed() => {
                        session.cache.set_total_lines(committed.line_count())
                    }
                    None => needs_probe = true,
                }
                session.cache.adopt(committed);
                if self.backend.echoes_writes() && !needs_probe {
                    session.sync.expect_echo(session.cache.total_lines());
                }

                let total_lines = session.cache.total_lines();
                self.events.publish(SyncEvent::Committed {
                    document: id.clone(),
                    total_lines,
                });
                if dirty_changed {
                    self.events.publish(SyncEvent::DirtyChanged {
                        document: id.clone(),
                        dirty: true,
                    });
                }
                self.events.publish(SyncEvent::TokensStale {
                    document: id.clone(),
                    lines: token_range(&session.cache, self.options.window_buffer_lines),
                });
                reflush
            }
            CommitOutcome::Failed { message, reflush } => {
                if session.closing && !reflush {
                    warn!(document = %id, "closed document dropped edits after a failed commit");
                }
                self.events.publish(SyncEvent::CommitFailed {
                    document: id.clone(),
                    message,
                });
                reflush
            }
        };

        let plan = session.cache.unlock_commit();
        let plan = match plan {
            Some(plan) => Some(plan),
            None if session.is_windowed() => {
                let visible = session.cache.visible();
                session.cache.on_viewport(visible)
            }
            None => None,
        };
        submit_fetch(&mut self.backend, id, &mut session.cache, plan);

        if needs_probe {
            self.probe(id);
        }
        if reflush {
            self.flush_document(id);
        }
        self.settle(id);
    }

    fn finish_probe(
        &mut self,
        id: &DocumentId,
        version: u64,
        result: Result<BackendReply, BackendError>,
    ) {
        let active = self.is_active(id);
        let current = self.current_text(id).unwrap_or_default();
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if version != session.probe_version {
            debug!(document = %id, version, "discarding stale probe reply");
            return;
        }
        let total = match result {
            Ok(BackendReply::LineCount(total)) => total,
            Ok(other) => {
                debug!(document = %id, reply = ?other, "malformed probe reply ignored");
                return;
            }
            Err(err) => {
                warn!(document = %id, error = %err, "line count probe failed");
                return;
            }
        };

        let changed = total != session.cache.total_lines();
        session.cache.set_total_lines(total);
        if !changed && !session.cache.has_deferred_resync() {
            return;
        }
        if !active
            || session.sync.is_composing()
            || session.sync.has_local_changes(&current)
        {
            session.cache.defer(changed);
            return;
        }
        debug!(document = %id, total_lines = total, changed, "re-validating restored document");
        let plan = if changed {
            session.cache.refresh()
        } else {
            session.cache.drain_deferred()
        };
        submit_fetch(&mut self.backend, id, &mut session.cache, plan);
    }

    fn reload(&mut self, id: &DocumentId) {
        let active = self.is_active(id);
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        let total_lines = session.cache.total_lines();
        info!(document = %id, total_lines, "reloading after external change");
        self.events.publish(SyncEvent::ExternalReload {
            document: id.clone(),
            total_lines,
        });
        if !active {
            session.cache.defer(true);
            return;
        }
        let plan = session.cache.refresh();
        submit_fetch(&mut self.backend, id, &mut session.cache, plan);
    }

    /// Runs after anything that may have ended a commit: finishes closes and drains deferred
    /// reloads and re-syncs once no local edits are left.
    fn settle(&mut self, id: &DocumentId) {
        let active = self.is_active(id);
        let current = self.current_text(id).unwrap_or_default();
        let Some(session) = self.sessions.get_mut(id) else {
            return;
        };
        if session.sync.is_in_flight() {
            return;
        }
        if session.closing {
            self.finish_close(id);
            return;
        }
        if session.sync.is_composing() || session.sync.has_local_changes(&current) {
            return;
        }
        if session.sync.take_deferred_reload() {
            self.reload(id);
            return;
        }
        // A window re-sync that was held back by edits which turned out to be no-ops.
        if active && session.cache.has_deferred_resync() {
            let plan = session.cache.drain_deferred();
            submit_fetch(&mut self.backend, id, &mut session.cache, plan);
        }
    }

    // ---------------------------------------------------------------------
    // Caret and selection
    // ---------------------------------------------------------------------

    /// Caret of the active document in document coordinates.
    pub fn caret(&self) -> Result<Caret, EditorError> {
        let id = self.active.as_ref().ok_or(EditorError::NoActiveDocument)?;
        let start_line = self.sessions.get(id).map_or(0, DocumentSession::start_line);
        Ok(self.selection_carets(start_line).1)
    }

    /// Current bracket/quote pair highlight.
    pub fn pair_highlight(&self) -> Option<PairHighlight> {
        self.pair
    }

    fn compute_pair(&self, id: &DocumentId) -> Option<PairHighlight> {
        if !self.options.pair_highlight_enabled() {
            return None;
        }
        let selection = self.surface.selection();
        if !selection.is_collapsed() {
            return None;
        }
        let display = self.surface.text();
        let text = from_display_text(&display, self.placeholder);
        let offset = display_to_text_offset(&display, self.placeholder, selection.focus);
        let start_line = self.sessions.get(id).map_or(0, DocumentSession::start_line);
        pair_highlight(&text, offset, start_line, self.options.max_pair_scan_line_len)
    }

    /// Start a vertical block selection at the caret.
    pub fn begin_vertical_selection(&mut self) -> Result<(), EditorError> {
        let caret = self.caret()?;
        self.vertical = Some(VerticalSelection::new(caret));
        self.rect = None;
        Ok(())
    }

    /// Extend the vertical selection one line and apply it to the surface.
    pub fn extend_vertical(
        &mut self,
        direction: VerticalDirection,
    ) -> Result<SurfaceSelection, EditorError> {
        let id = self.active_id()?;
        let mut vertical = match self.vertical {
            Some(vertical) => vertical,
            None => VerticalSelection::new(self.caret()?),
        };
        let start_line = self.sessions.get(&id).map_or(0, DocumentSession::start_line);
        let text = self.surface_text();
        vertical.extend(direction, start_line + 1, start_line + line_count(&text));

        let (start, end) = vertical.linear_range(&text, start_line);
        let (anchor, focus) = if vertical.focus_line < vertical.base_line {
            (end, start)
        } else {
            (start, end)
        };
        self.surface.set_selection(
            text_to_display_offset(&text, anchor),
            text_to_display_offset(&text, focus),
        );
        let selection = self.surface.selection();
        self.last_selection = Some(selection);
        self.vertical = Some(vertical);
        self.pair = None;
        Ok(selection)
    }

    /// Active vertical selection.
    pub fn vertical_selection(&self) -> Option<VerticalSelection> {
        self.vertical
    }

    /// Drop vertical and rectangular selection state.
    pub fn clear_block_selection(&mut self) {
        self.vertical = None;
        self.rect = None;
        self.rect_dragging = false;
    }

    /// Start a rectangular drag at `anchor`.
    pub fn begin_rect(&mut self, anchor: Caret) -> Result<RectBounds, EditorError> {
        self.active_id()?;
        let rect = RectSelection::new(anchor, anchor);
        self.rect = Some(rect);
        self.rect_dragging = true;
        self.vertical = None;
        Ok(rect.normalized())
    }

    /// Move the rectangle's focus corner.
    pub fn update_rect(&mut self, focus: Caret) -> Result<RectBounds, EditorError> {
        let rect = self.rect.as_mut().ok_or(EditorError::NoRectSelection)?;
        rect.set_focus(focus);
        Ok(rect.normalized())
    }

    /// The drag gesture ended; the rectangle stays until the caret moves.
    pub fn end_rect_drag(&mut self) {
        self.rect_dragging = false;
    }

    /// Normalized rectangle, if one is active.
    pub fn rect_bounds(&self) -> Option<RectBounds> {
        self.rect.map(|rect| rect.normalized())
    }

    /// Rows to auto-scroll while dragging with the pointer on `pointer_row` of the viewport.
    pub fn autoscroll_step(&self, pointer_row: isize) -> isize {
        autoscroll_step(
            pointer_row,
            self.viewport_rows,
            self.options.autoscroll_edge_rows,
        )
    }

    fn rect_context(&self) -> Result<(DocumentId, RectBounds, String, usize), EditorError> {
        let id = self.active_id()?;
        let rect = self.rect.ok_or(EditorError::NoRectSelection)?;
        let text = self.surface_text();
        let start_line = self.sessions.get(&id).map_or(0, DocumentSession::start_line);
        Ok((id, rect.normalized(), text, start_line))
    }

    /// Per-line slices of the rectangle.
    pub fn rect_slices(&self) -> Result<Vec<RectSlice>, EditorError> {
        let (_, bounds, text, start_line) = self.rect_context()?;
        Ok(rect_slices(&text, start_line, &bounds))
    }

    /// Block copy: one row per line.
    pub fn rect_copy(&self) -> Result<String, EditorError> {
        let (_, bounds, text, start_line) = self.rect_context()?;
        Ok(rect_copy(&text, start_line, &bounds))
    }

    /// Block cut: copy, then delete the rectangle's columns.
    pub fn rect_cut(&mut self) -> Result<String, EditorError> {
        let (id, bounds, text, start_line) = self.rect_context()?;
        let copied = rect_copy(&text, start_line, &bounds);
        let updated = rect_replace(&text, start_line, &bounds, "");
        self.apply_block_edit(&id, &updated, bounds.start_line, bounds.end_line, bounds.start_column);
        Ok(copied)
    }

    /// Type-through: replace the rectangle's columns on every line with `input`.
    pub fn rect_type(&mut self, input: &str) -> Result<(), EditorError> {
        let (id, bounds, text, start_line) = self.rect_context()?;
        let updated = rect_replace(&text, start_line, &bounds, input);
        let column = bounds.start_column + utf16_len(input);
        self.apply_block_edit(&id, &updated, bounds.start_line, bounds.end_line, column);
        Ok(())
    }

    /// Block paste: replace the rectangle with the rows of `clipboard`.
    ///
    /// Rows are padded to the widest row; rows past the end of the document become new lines.
    pub fn rect_paste(&mut self, clipboard: &str) -> Result<(), EditorError> {
        let (id, bounds, text, start_line) = self.rect_context()?;
        let rows: Vec<&str> = clipboard
            .split('\n')
            .map(|row| row.strip_suffix('\r').unwrap_or(row))
            .collect();
        let allow_append = self.sessions.get(&id).is_some_and(|session| {
            session
                .segment()
                .is_none_or(|segment| segment.end_line >= session.total_lines())
        });
        let cleared = rect_replace(&text, start_line, &bounds, "");
        let updated = rect_insert(
            &cleared,
            start_line,
            bounds.start_line,
            bounds.start_column,
            &rows,
            allow_append,
        );
        let width = rows.iter().map(|row| utf16_len(row)).max().unwrap_or(0);
        let last_line = bounds.start_line + rows.len().saturating_sub(1);
        let last_line = last_line.min(start_line + line_count(&updated));
        self.apply_block_edit(
            &id,
            &updated,
            bounds.start_line,
            last_line,
            bounds.start_column + width,
        );
        Ok(())
    }

    fn apply_block_edit(
        &mut self,
        id: &DocumentId,
        text: &str,
        first_line: usize,
        last_line: usize,
        column: usize,
    ) {
        let start_line = self.sessions.get(id).map_or(0, DocumentSession::start_line);
        let offset = Caret::new(last_line, column).to_offset(text, start_line);
        self.show_text(text);
        let offset = text_to_display_offset(text, offset);
        self.surface.set_selection(offset, offset);
        self.last_selection = Some(self.surface.selection());
        self.rect = Some(RectSelection::new(
            Caret::new(first_line, column),
            Caret::new(last_line, column),
        ));
        self.pair = None;
        self.flush_document(id);
    }
}
