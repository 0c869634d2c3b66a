//! Document backend contract.
//!
//! The authoritative document lives behind a [`DocumentBackend`]. The engine never blocks on
//! it: every call is a submission tagged with a [`Ticket`], and the host later hands the
//! matching [`BackendResponse`] (in any order) to [`Editor::handle_response`](crate::Editor::handle_response).
//!
//! Two implementations ship with this crate:
//! - [`memory::MemoryDocuments`]: a rope-backed authoritative store that answers requests
//!   synchronously. Hosts without a real service and the worker crate build on it.
//! - [`queued::QueuedBackend`]: records submissions so the caller decides when (and in which
//!   order) replies are delivered.

pub mod memory;
pub mod queued;

pub use crate::error::BackendError;
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a backend document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(Arc<str>);

impl DocumentId {
    /// Create a document id.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Borrow the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(Arc::from(value))
    }
}

/// Sentinel `end_line` meaning "to the end of the document".
pub const WHOLE_DOCUMENT: usize = usize::MAX;

/// Requests understood by a document backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendRequest {
    /// Read lines `start_line..end_line` as newline-joined text.
    ReadRange {
        /// Target document.
        id: DocumentId,
        /// First line (0-based).
        start_line: usize,
        /// Exclusive end line; [`WHOLE_DOCUMENT`] reads to the end.
        end_line: usize,
    },
    /// Read lines `start_line..end_line` as raw line strings.
    ReadChunk {
        /// Target document.
        id: DocumentId,
        /// First line (0-based).
        start_line: usize,
        /// Exclusive end line.
        end_line: usize,
    },
    /// Replace scalars `start_scalar..end_scalar` with `new_text`.
    PointEdit {
        /// Target document.
        id: DocumentId,
        /// Inclusive start scalar index.
        start_scalar: usize,
        /// Exclusive end scalar index.
        end_scalar: usize,
        /// Replacement text.
        new_text: String,
    },
    /// Replace lines `start_line..end_line` with the lines of `new_text`.
    ReplaceLines {
        /// Target document.
        id: DocumentId,
        /// First replaced line.
        start_line: usize,
        /// Exclusive end line.
        end_line: usize,
        /// Newline-joined replacement lines.
        new_text: String,
    },
    /// Query the current total line count.
    LineCount {
        /// Target document.
        id: DocumentId,
    },
}

impl BackendRequest {
    /// The document this request targets.
    pub fn document(&self) -> &DocumentId {
        match self {
            Self::ReadRange { id, .. }
            | Self::ReadChunk { id, .. }
            | Self::PointEdit { id, .. }
            | Self::ReplaceLines { id, .. }
            | Self::LineCount { id } => id,
        }
    }

    /// Returns `true` for requests that mutate the document.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::PointEdit { .. } | Self::ReplaceLines { .. })
    }
}

/// Successful backend replies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendReply {
    /// Newline-joined text (reply to [`BackendRequest::ReadRange`]).
    Text(String),
    /// Raw lines (reply to [`BackendRequest::ReadChunk`]).
    Lines(Vec<String>),
    /// New total line count (reply to edits and [`BackendRequest::LineCount`]).
    LineCount(usize),
}

/// What a ticket was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TicketKind {
    /// Segment / whole-text read.
    Fetch,
    /// Edit commit.
    Commit,
    /// Line-count probe.
    Probe,
}

/// Correlates a submission with its eventual response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ticket {
    /// Document the request belongs to.
    pub document: DocumentId,
    /// Request category.
    pub kind: TicketKind,
    /// Monotonic version within `(document, kind)`.
    pub version: u64,
}

impl Ticket {
    /// Create a ticket.
    pub fn new(document: DocumentId, kind: TicketKind, version: u64) -> Self {
        Self {
            document,
            kind,
            version,
        }
    }
}

/// A completed backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendResponse {
    /// Ticket passed to [`DocumentBackend::submit`].
    pub ticket: Ticket,
    /// Reply or failure.
    pub result: Result<BackendReply, BackendError>,
}

/// Push notifications from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendNotification {
    /// The document changed through some channel; `total_lines` is authoritative.
    LinesChanged {
        /// Changed document.
        id: DocumentId,
        /// New total line count.
        total_lines: usize,
    },
}

/// Anything a backend can deliver to the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMessage {
    /// Reply to a submission.
    Response(BackendResponse),
    /// Unsolicited change notification.
    Notification(BackendNotification),
}

/// The authoritative document service.
///
/// `submit` only enqueues; it must not call back into the editor. A returned error means the
/// request was never accepted and no response will follow.
pub trait DocumentBackend {
    /// Submit `request`; the response must carry `ticket` unchanged.
    fn submit(&mut self, ticket: Ticket, request: BackendRequest) -> Result<(), BackendError>;

    /// Returns `true` if a successful mutation is followed by a
    /// [`BackendNotification::LinesChanged`] to the submitter as well, after its response.
    fn echoes_writes(&self) -> bool {
        false
    }
}

impl<B: DocumentBackend + ?Sized> DocumentBackend for Box<B> {
    fn submit(&mut self, ticket: Ticket, request: BackendRequest) -> Result<(), BackendError> {
        (**self).submit(ticket, request)
    }

    fn echoes_writes(&self) -> bool {
        (**self).echoes_writes()
    }
}

impl<B: DocumentBackend + ?Sized> DocumentBackend for &mut B {
    fn submit(&mut self, ticket: Ticket, request: BackendRequest) -> Result<(), BackendError> {
        (**self).submit(ticket, request)
    }

    fn echoes_writes(&self) -> bool {
        (**self).echoes_writes()
    }
}
