//! Change notifications for observers of the synchronization engine.
//!
//! Tab metadata, token providers and other listeners subscribe to an [`EventBus`] and receive
//! [`SyncEvent`] values over a `crossbeam-channel` receiver. Publishing never blocks; receivers
//! that have been dropped are pruned on the next publish.

use crate::backend::DocumentId;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::ops::Range;

/// Something observers may care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A commit was confirmed by the backend.
    Committed {
        /// Document that was committed.
        document: DocumentId,
        /// Authoritative total line count after the commit.
        total_lines: usize,
    },
    /// The unsaved-changes flag flipped.
    DirtyChanged {
        /// Affected document.
        document: DocumentId,
        /// New flag value.
        dirty: bool,
    },
    /// Syntax tokens for these lines must be re-requested.
    TokensStale {
        /// Affected document.
        document: DocumentId,
        /// Document line range (0-based, half-open).
        lines: Range<usize>,
    },
    /// The materialized segment was replaced wholesale.
    SegmentReplaced {
        /// Affected document.
        document: DocumentId,
        /// New segment line range (0-based, half-open).
        lines: Range<usize>,
    },
    /// The document is being reloaded because of an external change.
    ExternalReload {
        /// Affected document.
        document: DocumentId,
        /// Line count reported by the notification.
        total_lines: usize,
    },
    /// A commit failed; local edits are kept and will be resent.
    CommitFailed {
        /// Affected document.
        document: DocumentId,
        /// Human-readable failure.
        message: String,
    },
}

impl SyncEvent {
    /// The document the event concerns.
    pub fn document(&self) -> &DocumentId {
        match self {
            Self::Committed { document, .. }
            | Self::DirtyChanged { document, .. }
            | Self::TokensStale { document, .. }
            | Self::SegmentReplaced { document, .. }
            | Self::ExternalReload { document, .. }
            | Self::CommitFailed { document, .. } => document,
        }
    }
}

/// Fan-out publisher for [`SyncEvent`]s.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Vec<Sender<SyncEvent>>,
}

impl EventBus {
    /// Create a bus without subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Number of live subscribers (as of the last publish).
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Send `event` to every subscriber, dropping disconnected ones.
    pub fn publish(&mut self, event: SyncEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_prunes_dropped_subscribers() {
        let mut bus = EventBus::new();
        let keep = bus.subscribe();
        let dropped = bus.subscribe();
        drop(dropped);

        bus.publish(SyncEvent::DirtyChanged {
            document: DocumentId::new("a"),
            dirty: true,
        });

        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(
            keep.try_recv().unwrap(),
            SyncEvent::DirtyChanged {
                document: DocumentId::new("a"),
                dirty: true,
            }
        );
    }
}
