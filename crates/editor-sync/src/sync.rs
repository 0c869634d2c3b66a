//! Debounced commit engine.
//!
//! [`SyncEngine`] tracks, for a single document, the last backend-confirmed text and the
//! commit that is currently travelling to the backend. It decides *what* to send and *when*;
//! the [`Editor`](crate::Editor) submits the resulting requests.
//!
//! Guarantees:
//! - at most one commit is in flight per document
//! - edits made while a commit is in flight (or while composing) are coalesced into exactly one
//!   follow-up commit
//! - a failed commit keeps the local text; the next flush re-diffs against the last confirmed
//!   base and resends a (possibly larger) delta

use crate::backend::{BackendError, BackendReply, BackendRequest, DocumentId};
use crate::diff::build_diff;
use crate::timer::Deadline;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Commit bookkeeping for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingEdit {
    /// Last backend-confirmed text (whole document, or the segment in windowed mode).
    pub base_text: String,
    /// Set by local edits and by flushes that had to wait.
    pub requested: bool,
    /// Commit awaiting its reply.
    pub in_flight: Option<InFlightCommit>,
}

/// A commit that has been submitted but not answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightCommit {
    /// Ticket version of the commit.
    pub version: u64,
    /// Full local text the commit brings the backend to.
    pub sent_text: String,
    /// Document line the diffed text starts at (0 for whole documents).
    pub start_line: usize,
}

/// How a commit addresses the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitTarget {
    /// The diffed text is the whole document: send a scalar point edit.
    Document,
    /// The diffed text is a segment starting at `start_line`: send a line-range replace.
    Lines {
        /// First document line of the segment.
        start_line: usize,
    },
}

/// A commit ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitPlan {
    /// Ticket version to tag the submission with.
    pub version: u64,
    /// Request to submit.
    pub request: BackendRequest,
}

/// Result of [`SyncEngine::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A commit is in flight or composition is active; the flush will be retried.
    Deferred,
    /// Nothing changed since the last confirmed base.
    Clean,
    /// Submit this commit.
    Send(CommitPlan),
}

/// Result of feeding a commit reply into the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The reply does not belong to the in-flight commit.
    Stale,
    /// The backend accepted the commit.
    Confirmed {
        /// Authoritative line count, if the reply carried one.
        total_lines: Option<usize>,
        /// Text that is now the confirmed base.
        sent_text: String,
        /// Document line the committed text starts at.
        start_line: usize,
        /// `true` if the document just became dirty.
        dirty_changed: bool,
        /// `true` if edits arrived during the flight and must be flushed now.
        reflush: bool,
    },
    /// The backend rejected the commit; local edits were kept.
    Failed {
        /// Human-readable failure.
        message: String,
        /// `true` if edits arrived during the flight and must be flushed now.
        reflush: bool,
    },
}

/// What to do about an external change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalChange {
    /// Echo of our own commit; ignored.
    Suppressed,
    /// Reload the window / whole text now.
    Reload,
    /// Local edits are pending; reload once the commit settles.
    Deferred,
}

/// Per-document synchronization state.
#[derive(Debug, Clone)]
pub struct SyncEngine {
    document: DocumentId,
    pending: PendingEdit,
    debounce: Deadline,
    delay: Duration,
    commit_version: u64,
    composing: bool,
    dirty: bool,
    expected_echo: Option<usize>,
    reload_deferred: bool,
}

impl SyncEngine {
    /// Create an engine that debounces local edits by `delay`.
    pub fn new(document: DocumentId, delay: Duration) -> Self {
        Self {
            document,
            pending: PendingEdit::default(),
            debounce: Deadline::new(),
            delay,
            commit_version: 0,
            composing: false,
            dirty: false,
            expected_echo: None,
            reload_deferred: false,
        }
    }

    /// Document this engine commits to.
    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    /// Commit bookkeeping.
    pub fn pending(&self) -> &PendingEdit {
        &self.pending
    }

    /// Last confirmed text.
    pub fn base_text(&self) -> &str {
        &self.pending.base_text
    }

    /// Replace the confirmed base (after adopting a fetched segment or text).
    ///
    /// Fetched text already reflects every earlier commit, so a pending echo is no longer
    /// expected.
    pub fn set_base(&mut self, text: impl Into<String>) {
        self.pending.base_text = text.into();
        self.expected_echo = None;
    }

    /// Expect one change notification reporting `total_lines` as the echo of a confirmed
    /// commit.
    pub fn expect_echo(&mut self, total_lines: usize) {
        self.expected_echo = Some(total_lines);
    }

    /// Line count of the echo still expected for the last confirmed commit.
    pub fn expected_echo(&self) -> Option<usize> {
        self.expected_echo
    }

    /// Returns `true` while a commit awaits its reply.
    pub fn is_in_flight(&self) -> bool {
        self.pending.in_flight.is_some()
    }

    /// Returns `true` while composition input is active.
    pub fn is_composing(&self) -> bool {
        self.composing
    }

    /// Unsaved-changes flag.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Set the unsaved-changes flag, returning `true` if it flipped.
    pub fn set_dirty(&mut self, dirty: bool) -> bool {
        let changed = self.dirty != dirty;
        self.dirty = dirty;
        changed
    }

    /// Debounce deadline, if armed.
    pub fn debounce_deadline(&self) -> Option<Instant> {
        self.debounce.at()
    }

    /// Returns `true` if `current` differs from the confirmed base, or a commit is in flight.
    pub fn has_local_changes(&self, current: &str) -> bool {
        self.is_in_flight() || self.pending.requested || current != self.pending.base_text
    }

    /// A local edit happened: request a flush and (re)arm the debounce.
    pub fn on_local_change(&mut self, now: Instant) {
        self.pending.requested = true;
        self.debounce.schedule(now, self.delay);
    }

    /// Returns `true` if the debounce deadline fired at `now`.
    pub fn tick(&mut self, now: Instant) -> bool {
        self.debounce.take_due(now)
    }

    /// Drop the debounce deadline.
    pub fn cancel_timers(&mut self) {
        self.debounce.cancel();
    }

    /// Composition started; flushes wait until it ends.
    pub fn begin_composition(&mut self) {
        self.composing = true;
    }

    /// Composition ended; the composed text is flushed after the debounce.
    pub fn end_composition(&mut self, now: Instant) {
        self.composing = false;
        self.on_local_change(now);
    }

    /// Compute the commit that brings the backend from the confirmed base to `current`.
    pub fn flush(&mut self, current: &str, target: CommitTarget) -> FlushOutcome {
        self.debounce.cancel();
        if self.is_in_flight() || self.composing {
            debug!(document = %self.document, "flush deferred");
            self.pending.requested = true;
            return FlushOutcome::Deferred;
        }
        self.pending.requested = false;

        let Some(diff) = build_diff(&self.pending.base_text, current) else {
            debug!(document = %self.document, "flush found no changes");
            return FlushOutcome::Clean;
        };

        let (request, start_line) = match target {
            CommitTarget::Document => {
                let edit = diff.to_scalar(&self.pending.base_text);
                (
                    BackendRequest::PointEdit {
                        id: self.document.clone(),
                        start_scalar: edit.start_scalar,
                        end_scalar: edit.end_scalar,
                        new_text: edit.new_text,
                    },
                    0,
                )
            }
            CommitTarget::Lines { start_line } => {
                let lines = diff.to_line_replace(&self.pending.base_text, current);
                (
                    BackendRequest::ReplaceLines {
                        id: self.document.clone(),
                        start_line: start_line + lines.start_line,
                        end_line: start_line + lines.end_line,
                        new_text: lines.new_text,
                    },
                    start_line,
                )
            }
        };

        self.commit_version += 1;
        self.pending.in_flight = Some(InFlightCommit {
            version: self.commit_version,
            sent_text: current.to_string(),
            start_line,
        });
        debug!(
            document = %self.document,
            version = self.commit_version,
            start = diff.start,
            end = diff.end,
            inserted = diff.replacement.len(),
            "commit sent"
        );
        FlushOutcome::Send(CommitPlan {
            version: self.commit_version,
            request,
        })
    }

    /// Feed the reply for commit `version` into the engine.
    pub fn on_commit_result(
        &mut self,
        version: u64,
        result: Result<BackendReply, BackendError>,
    ) -> CommitOutcome {
        let matches = self
            .pending
            .in_flight
            .as_ref()
            .is_some_and(|commit| commit.version == version);
        if !matches {
            debug!(document = %self.document, version, "discarding stale commit reply");
            return CommitOutcome::Stale;
        }
        let Some(commit) = self.pending.in_flight.take() else {
            return CommitOutcome::Stale;
        };
        let reflush = self.pending.requested;

        match result {
            Ok(reply) => {
                let total_lines = match reply {
                    BackendReply::LineCount(total) => Some(total),
                    other => {
                        debug!(document = %self.document, reply = ?other, "commit reply carried no line count");
                        None
                    }
                };
                self.pending.base_text = commit.sent_text.clone();
                let dirty_changed = self.set_dirty(true);
                info!(document = %self.document, version, total_lines, "commit confirmed");
                CommitOutcome::Confirmed {
                    total_lines,
                    sent_text: commit.sent_text,
                    start_line: commit.start_line,
                    dirty_changed,
                    reflush,
                }
            }
            Err(err) => {
                warn!(document = %self.document, version, error = %err, "commit failed; keeping local edits");
                CommitOutcome::Failed {
                    message: err.to_string(),
                    reflush,
                }
            }
        }
    }

    /// An external change notification reporting `total_lines` arrived.
    ///
    /// Only a notification matching [`SyncEngine::expect_echo`] counts as the echo of our own
    /// commit; any other notification is a real change and clears the expectation.
    pub fn on_external_change(&mut self, current: &str, total_lines: usize) -> ExternalChange {
        if self.expected_echo.take() == Some(total_lines) {
            debug!(document = %self.document, total_lines, "ignoring echo of own commit");
            return ExternalChange::Suppressed;
        }
        if self.composing || self.has_local_changes(current) {
            self.reload_deferred = true;
            debug!(document = %self.document, "external reload deferred until commit settles");
            return ExternalChange::Deferred;
        }
        ExternalChange::Reload
    }

    /// Abandon composition without flushing (document switched away mid-composition).
    pub fn cancel_composition(&mut self) {
        self.composing = false;
    }

    /// Hold a reload back until local edits settle.
    pub fn defer_reload(&mut self) {
        self.reload_deferred = true;
    }

    /// Returns `true` (once) if an external reload was deferred.
    pub fn take_deferred_reload(&mut self) -> bool {
        std::mem::take(&mut self.reload_deferred)
    }

    /// Returns `true` if an external reload is waiting.
    pub fn has_deferred_reload(&self) -> bool {
        self.reload_deferred
    }
}
