//! Windowed segment cache.
//!
//! A [`Segment`] is the slice of a document that is materialized on the edit surface. For
//! ordinary documents it is the whole document; for windowed ("huge") documents it is the
//! viewport plus a buffer margin on both sides.
//!
//! [`SegmentCache`] is the per-document state machine that decides when to fetch:
//!
//! ```text
//!            viewport outside segment / refresh
//!   Idle ──────────────────────────────────────────▶ Fetching(v)
//!    ▲                                                  │
//!    │    response tagged v == latest issued version    │
//!    └──────────────────────────────────────────────────┘
//!         (older versions are discarded as stale)
//! ```
//!
//! The cache never talks to the backend itself: it hands out [`FetchPlan`]s that the caller
//! submits, and interprets the replies it is given back.

use crate::backend::{BackendError, BackendReply};
use crate::coords::line_count;
use std::ops::Range;
use tracing::{debug, warn};

/// A materialized, locally editable line range of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// First line (0-based).
    pub start_line: usize,
    /// Exclusive end line.
    pub end_line: usize,
    /// Newline-joined text of the lines in `start_line..end_line`.
    pub text: String,
}

impl Segment {
    /// Build a segment starting at `start_line`; the end is derived from the text.
    pub fn new(start_line: usize, text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            start_line,
            end_line: start_line + line_count(&text),
            text,
        }
    }

    /// Build a segment from raw line strings. Returns `None` for an empty line list.
    pub fn from_lines(start_line: usize, lines: &[String]) -> Option<Self> {
        if lines.is_empty() {
            return None;
        }
        Some(Self {
            start_line,
            end_line: start_line + lines.len(),
            text: lines.join("\n"),
        })
    }

    /// Build a segment from newline-joined text that was requested for `lines`.
    ///
    /// Backends that terminate every line with `'\n'` produce one trailing empty line too many;
    /// it is dropped unless the requested range really ends with an empty line.
    pub fn from_range_text(lines: Range<usize>, text: impl Into<String>) -> Self {
        let mut text = text.into();
        let wanted = lines.end.saturating_sub(lines.start).max(1);
        if line_count(&text) > wanted && text.ends_with('\n') {
            text.pop();
        }
        Self::new(lines.start, text)
    }

    /// Line range covered by this segment.
    pub fn lines(&self) -> Range<usize> {
        self.start_line..self.end_line
    }

    /// Number of lines in the segment.
    pub fn line_count(&self) -> usize {
        self.end_line - self.start_line
    }

    /// Returns `true` if `line` (0-based) is materialized.
    pub fn contains_line(&self, line: usize) -> bool {
        self.lines().contains(&line)
    }

    /// Returns `true` if every line of `visible` is materialized.
    pub fn covers(&self, visible: &Range<usize>) -> bool {
        visible.start >= self.start_line && visible.end <= self.end_line
    }
}

/// Compute the line window to materialize for a visible range.
///
/// `start = max(0, visible.start - buffer)`, `end = min(total, visible.end + buffer)`. The
/// window always contains at least one line of a non-empty document.
pub fn window_for(visible: &Range<usize>, total_lines: usize, buffer: usize) -> Range<usize> {
    let total = total_lines.max(1);
    let start = visible.start.saturating_sub(buffer).min(total - 1);
    let end = visible
        .end
        .max(visible.start)
        .saturating_add(buffer)
        .min(total)
        .max(start + 1);
    start..end
}

/// A fetch the caller should submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    /// Version to tag the request with.
    pub version: u64,
    /// Lines to read. For whole-document fetches `end` is
    /// [`WHOLE_DOCUMENT`](crate::backend::WHOLE_DOCUMENT).
    pub lines: Range<usize>,
    /// `true` for a whole-document text read, `false` for a line chunk read.
    pub whole_document: bool,
}

/// Observable state of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchState {
    /// No fetch outstanding.
    Idle,
    /// The newest fetch is outstanding.
    Fetching {
        /// Version of the newest fetch.
        version: u64,
        /// Lines requested by it.
        lines: Range<usize>,
    },
}

/// Result of feeding a reply into the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The reply is current; the caller decides whether to adopt the segment.
    Ready(Segment),
    /// A newer fetch was issued after this one; the reply was discarded.
    Stale,
    /// The backend failed; the last good segment is kept.
    Failed,
    /// The reply had the wrong shape; ignored.
    Malformed,
}

/// Reasons the window may not move right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowLock {
    /// A commit is awaiting its reply.
    pub commit_in_flight: bool,
    /// Composition (IME) input is active.
    pub composing: bool,
    /// Composition just ended; the unlock delay has not elapsed yet.
    pub unlock_pending: bool,
}

impl WindowLock {
    /// Returns `true` if any reason holds.
    pub fn is_locked(&self) -> bool {
        self.commit_in_flight || self.composing || self.unlock_pending
    }
}

/// Per-document segment state machine.
#[derive(Debug, Clone)]
pub struct SegmentCache {
    windowed: bool,
    buffer: usize,
    total_lines: usize,
    segment: Option<Segment>,
    visible: Range<usize>,
    latest_version: u64,
    outstanding: Option<(u64, Range<usize>)>,
    lock: WindowLock,
    deferred: Option<bool>,
}

impl SegmentCache {
    /// Create a cache for a document of `total_lines` lines.
    ///
    /// `windowed` selects line-chunk fetching around the viewport with a `buffer` line margin;
    /// otherwise the whole document is fetched.
    pub fn new(windowed: bool, buffer: usize, total_lines: usize) -> Self {
        Self {
            windowed,
            buffer,
            total_lines: total_lines.max(1),
            segment: None,
            visible: 0..0,
            latest_version: 0,
            outstanding: None,
            lock: WindowLock::default(),
            deferred: None,
        }
    }

    /// Returns `true` in windowed mode.
    pub fn is_windowed(&self) -> bool {
        self.windowed
    }

    /// Buffer margin in lines.
    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Current segment, if any has been adopted.
    pub fn segment(&self) -> Option<&Segment> {
        self.segment.as_ref()
    }

    /// Authoritative total line count as last reported.
    pub fn total_lines(&self) -> usize {
        self.total_lines
    }

    /// Update the authoritative total line count.
    pub fn set_total_lines(&mut self, total_lines: usize) {
        self.total_lines = total_lines.max(1);
    }

    /// Last visible range reported by the host.
    pub fn visible(&self) -> Range<usize> {
        self.visible.clone()
    }

    /// Version of the newest fetch issued.
    pub fn latest_version(&self) -> u64 {
        self.latest_version
    }

    /// Current fetch state.
    pub fn state(&self) -> FetchState {
        match &self.outstanding {
            Some((version, lines)) => FetchState::Fetching {
                version: *version,
                lines: lines.clone(),
            },
            None => FetchState::Idle,
        }
    }

    /// Current lock reasons.
    pub fn lock(&self) -> WindowLock {
        self.lock
    }

    /// Returns `true` if the window may not move.
    pub fn is_locked(&self) -> bool {
        self.windowed && self.lock.is_locked()
    }

    /// Returns `true` if a re-sync is waiting for the lock to release.
    pub fn has_deferred_resync(&self) -> bool {
        self.deferred.is_some()
    }

    /// Replace the segment without a fetch (restore, commit baseline).
    pub fn adopt(&mut self, segment: Segment) {
        self.segment = Some(segment);
    }

    /// Forget the segment (document reload).
    pub fn clear_segment(&mut self) {
        self.segment = None;
    }

    /// Window that would be materialized for `visible` right now.
    pub fn window_for_visible(&self, visible: &Range<usize>) -> Range<usize> {
        window_for(visible, self.total_lines, self.buffer)
    }

    /// The host's visible range changed.
    pub fn on_viewport(&mut self, visible: Range<usize>) -> Option<FetchPlan> {
        self.visible = visible;
        if self.is_locked() {
            self.defer(false);
            return None;
        }
        self.plan(false)
    }

    /// Force a re-fetch of the current window (or whole document).
    pub fn refresh(&mut self) -> Option<FetchPlan> {
        if self.is_locked() {
            self.defer(true);
            return None;
        }
        self.plan(true)
    }

    /// Record that the re-sync must wait (e.g. unsent local edits).
    pub fn defer(&mut self, force: bool) {
        let forced = self.deferred.unwrap_or(false) || force;
        self.deferred = Some(forced);
    }

    fn plan(&mut self, force: bool) -> Option<FetchPlan> {
        if !self.windowed {
            if !force && self.segment.is_some() {
                return None;
            }
            let lines = 0..crate::backend::WHOLE_DOCUMENT;
            if !force
                && self
                    .outstanding
                    .as_ref()
                    .is_some_and(|(_, pending)| *pending == lines)
            {
                return None;
            }
            return Some(self.issue(lines, true));
        }

        // Rows past the end of the document can never be materialized.
        let wanted = self.visible.start.min(self.total_lines - 1)
            ..self.visible.end.min(self.total_lines);
        if !force
            && self
                .segment
                .as_ref()
                .is_some_and(|segment| segment.covers(&wanted))
        {
            return None;
        }

        let window = self.window_for_visible(&self.visible);
        if !force
            && self
                .outstanding
                .as_ref()
                .is_some_and(|(_, pending)| *pending == window)
        {
            return None;
        }
        Some(self.issue(window, false))
    }

    fn issue(&mut self, lines: Range<usize>, whole_document: bool) -> FetchPlan {
        self.latest_version += 1;
        self.outstanding = Some((self.latest_version, lines.clone()));
        debug!(
            version = self.latest_version,
            start_line = lines.start,
            end_line = lines.end,
            "segment fetch issued"
        );
        FetchPlan {
            version: self.latest_version,
            lines,
            whole_document,
        }
    }

    /// Forget an issued fetch that never reached the backend.
    pub fn abandon(&mut self, version: u64) {
        if self
            .outstanding
            .as_ref()
            .is_some_and(|(pending, _)| *pending == version)
        {
            self.outstanding = None;
        }
    }

    /// Feed a fetch reply tagged with `version` into the cache.
    pub fn apply(
        &mut self,
        version: u64,
        result: Result<BackendReply, BackendError>,
    ) -> FetchOutcome {
        if version != self.latest_version {
            debug!(
                version,
                latest = self.latest_version,
                "discarding stale segment fetch"
            );
            return FetchOutcome::Stale;
        }
        let Some((_, lines)) = self.outstanding.take() else {
            debug!(version, "fetch reply without outstanding request");
            return FetchOutcome::Stale;
        };

        match result {
            Err(err) => {
                warn!(version, error = %err, "segment fetch failed; keeping last segment");
                FetchOutcome::Failed
            }
            Ok(BackendReply::Lines(raw)) if self.windowed => {
                match Segment::from_lines(lines.start, &raw) {
                    Some(segment) => {
                        if segment.end_line < lines.end {
                            // Backends clamp reads to the document, so a short reply means it
                            // shrank.
                            self.total_lines = segment.end_line;
                        }
                        FetchOutcome::Ready(segment)
                    }
                    None => {
                        debug!(version, "empty chunk reply ignored");
                        FetchOutcome::Malformed
                    }
                }
            }
            Ok(BackendReply::Text(text)) if !self.windowed => {
                let segment = Segment::new(0, text);
                self.total_lines = segment.line_count();
                FetchOutcome::Ready(segment)
            }
            Ok(BackendReply::Text(text)) => {
                FetchOutcome::Ready(Segment::from_range_text(lines, text))
            }
            Ok(other) => {
                debug!(version, reply = ?other, "malformed fetch reply ignored");
                FetchOutcome::Malformed
            }
        }
    }

    /// Mark a commit as in flight (locks the window).
    pub fn lock_commit(&mut self) {
        self.lock.commit_in_flight = true;
    }

    /// The in-flight commit completed; drains a deferred re-sync if nothing else holds the lock.
    pub fn unlock_commit(&mut self) -> Option<FetchPlan> {
        self.lock.commit_in_flight = false;
        self.drain_deferred()
    }

    /// Composition started.
    pub fn begin_composition(&mut self) {
        self.lock.composing = true;
        self.lock.unlock_pending = false;
    }

    /// Composition ended; the lock stays until [`SegmentCache::release_unlock`].
    pub fn end_composition(&mut self) {
        self.lock.composing = false;
        self.lock.unlock_pending = true;
    }

    /// Drop both composition lock reasons at once.
    pub fn cancel_composition(&mut self) {
        self.lock.composing = false;
        self.lock.unlock_pending = false;
    }

    /// The post-composition delay elapsed.
    pub fn release_unlock(&mut self) -> Option<FetchPlan> {
        self.lock.unlock_pending = false;
        self.drain_deferred()
    }

    /// Issue the deferred re-sync if the window is free.
    pub fn drain_deferred(&mut self) -> Option<FetchPlan> {
        if self.is_locked() {
            return None;
        }
        let force = self.deferred.take()?;
        debug!(force, "draining deferred window re-sync");
        self.plan(force)
    }
}
