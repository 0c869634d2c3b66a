//! Error types.

use crate::backend::DocumentId;
use thiserror::Error;

/// Failures reported by a [`DocumentBackend`](crate::DocumentBackend).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The backend has no document with this id.
    #[error("unknown document '{0}'")]
    UnknownDocument(DocumentId),
    /// A line or scalar range did not fit the document.
    #[error("range {start}..{end} is out of bounds for document '{id}'")]
    OutOfRange {
        /// Target document.
        id: DocumentId,
        /// Requested start.
        start: usize,
        /// Requested end.
        end: usize,
    },
    /// The request could not be delivered (worker stopped, channel closed, ...).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Any other backend-side failure.
    #[error("{0}")]
    Other(String),
}

/// Errors returned by [`Editor`](crate::Editor) operations.
///
/// Backend failures never surface here; they are logged and retried on the next natural
/// trigger. These errors only describe host misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditorError {
    /// No document is active on the surface.
    #[error("no active document")]
    NoActiveDocument,
    /// The document id is not open in this editor.
    #[error("document '{0}' is not open")]
    DocumentNotOpen(DocumentId),
    /// The requested selection operation needs a rectangular selection.
    #[error("no rectangular selection is active")]
    NoRectSelection,
}
