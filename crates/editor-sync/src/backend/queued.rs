//! A backend that only records submissions.
//!
//! [`QueuedBackend`] lets a host (or a test) decide exactly when and in which order replies
//! reach the editor, which is how out-of-order completion is reproduced deterministically.

use super::{
    BackendError, BackendRequest, BackendResponse, DocumentBackend, Ticket, TicketKind,
    memory::MemoryDocuments,
};
use std::collections::VecDeque;

/// A submission waiting for a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    /// Ticket to echo back.
    pub ticket: Ticket,
    /// The submitted request.
    pub request: BackendRequest,
}

impl QueuedRequest {
    /// Answer this request from `docs`.
    pub fn answer(&self, docs: &mut MemoryDocuments) -> BackendResponse {
        BackendResponse {
            ticket: self.ticket.clone(),
            result: docs.execute(&self.request),
        }
    }

    /// Fail this request with `error`.
    pub fn fail(&self, error: BackendError) -> BackendResponse {
        BackendResponse {
            ticket: self.ticket.clone(),
            result: Err(error),
        }
    }
}

/// Records every submission in FIFO order.
#[derive(Debug, Default)]
pub struct QueuedBackend {
    pending: VecDeque<QueuedRequest>,
    submitted: usize,
    reject_next: Option<BackendError>,
    echoes_writes: bool,
}

impl QueuedBackend {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of requests waiting for a reply.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Total number of accepted submissions so far.
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Borrow the waiting requests (oldest first).
    pub fn pending(&self) -> impl Iterator<Item = &QueuedRequest> {
        self.pending.iter()
    }

    /// Count waiting requests of one kind.
    pub fn count_kind(&self, kind: TicketKind) -> usize {
        self.pending.iter().filter(|q| q.ticket.kind == kind).count()
    }

    /// Remove and return the oldest waiting request.
    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        self.pending.pop_front()
    }

    /// Remove and return the newest waiting request.
    pub fn pop_back(&mut self) -> Option<QueuedRequest> {
        self.pending.pop_back()
    }

    /// Remove and return the oldest waiting request of `kind`.
    pub fn take_kind(&mut self, kind: TicketKind) -> Option<QueuedRequest> {
        let index = self.pending.iter().position(|q| q.ticket.kind == kind)?;
        self.pending.remove(index)
    }

    /// Declare whether whoever answers this queue also sends the echo notification of each
    /// write (off by default).
    pub fn set_echoes_writes(&mut self, echoes: bool) {
        self.echoes_writes = echoes;
    }

    /// Make the next [`DocumentBackend::submit`] call fail without queueing.
    pub fn reject_next(&mut self, error: BackendError) {
        self.reject_next = Some(error);
    }

    /// Answer every waiting request in FIFO order.
    pub fn drain_with(&mut self, docs: &mut MemoryDocuments) -> Vec<BackendResponse> {
        self.pending.drain(..).map(|q| q.answer(docs)).collect()
    }
}

impl DocumentBackend for QueuedBackend {
    fn submit(&mut self, ticket: Ticket, request: BackendRequest) -> Result<(), BackendError> {
        if let Some(error) = self.reject_next.take() {
            return Err(error);
        }
        self.submitted += 1;
        self.pending.push_back(QueuedRequest { ticket, request });
        Ok(())
    }

    fn echoes_writes(&self) -> bool {
        self.echoes_writes
    }
}
