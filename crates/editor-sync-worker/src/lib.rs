//! Threaded document backend for `editor-sync`.
//!
//! [`spawn_backend`] moves a [`MemoryDocuments`] store onto a dedicated thread and returns a
//! [`DocumentWorker`]. Each editor (or any other writer) connects with
//! [`DocumentWorker::connect`] and gets a [`BackendHandle`], which implements
//! [`DocumentBackend`] and receives its own responses plus every change notification.
//!
//! After a successful mutation the worker broadcasts
//! [`BackendNotification::LinesChanged`] to all connected handles, the originator included;
//! handles report this through [`DocumentBackend::echoes_writes`], so the editor recognizes
//! the echo of its own commit and ignores it.
//!
//! ```rust
//! use editor_sync::{BackendMessage, BackendReply, BackendRequest, DocumentBackend, DocumentId,
//!     MemoryDocuments, Ticket, TicketKind};
//! use editor_sync_worker::spawn_backend;
//! use std::time::Duration;
//!
//! let id = DocumentId::new("a.txt");
//! let mut docs = MemoryDocuments::new();
//! docs.insert(id.clone(), "one\ntwo");
//!
//! let worker = spawn_backend(docs).unwrap();
//! let mut handle = worker.connect();
//! handle
//!     .submit(Ticket::new(id.clone(), TicketKind::Probe, 1), BackendRequest::LineCount { id })
//!     .unwrap();
//! match handle.recv_timeout(Duration::from_secs(2)) {
//!     Some(BackendMessage::Response(response)) => {
//!         assert_eq!(response.result, Ok(BackendReply::LineCount(2)));
//!     }
//!     other => panic!("unexpected message: {other:?}"),
//! }
//! worker.shutdown();
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use editor_sync::{
    BackendError, BackendMessage, BackendNotification, BackendReply, BackendRequest,
    BackendResponse, DocumentBackend, MemoryDocuments, Ticket,
};
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

const THREAD_NAME: &str = "editor-sync-backend";

type ClientId = u64;

enum WorkerCmd {
    Connect {
        client: ClientId,
        tx: Sender<BackendMessage>,
    },
    Disconnect(ClientId),
    Submit {
        client: ClientId,
        ticket: Ticket,
        request: BackendRequest,
    },
    Shutdown,
}

/// Owner of the backend thread.
///
/// Dropping the worker stops the thread once every queued command has been served.
pub struct DocumentWorker {
    cmd_tx: Sender<WorkerCmd>,
    next_client: AtomicU64,
    join: Option<JoinHandle<MemoryDocuments>>,
}

/// One connection to a [`DocumentWorker`].
pub struct BackendHandle {
    client: ClientId,
    cmd_tx: Sender<WorkerCmd>,
    msg_rx: Receiver<BackendMessage>,
}

/// Spawn the backend thread serving `docs`.
pub fn spawn_backend(docs: MemoryDocuments) -> io::Result<DocumentWorker> {
    let (cmd_tx, cmd_rx) = unbounded();
    let join = thread::Builder::new()
        .name(THREAD_NAME.to_string())
        .spawn(move || run(docs, cmd_rx))?;
    info!("document backend started");
    Ok(DocumentWorker {
        cmd_tx,
        next_client: AtomicU64::new(1),
        join: Some(join),
    })
}

impl DocumentWorker {
    /// Open a new connection.
    pub fn connect(&self) -> BackendHandle {
        let client = self.next_client.fetch_add(1, Ordering::Relaxed);
        let (tx, msg_rx) = unbounded();
        if self.cmd_tx.send(WorkerCmd::Connect { client, tx }).is_err() {
            warn!(client, "connect after the backend stopped");
        }
        BackendHandle {
            client,
            cmd_tx: self.cmd_tx.clone(),
            msg_rx,
        }
    }

    /// Stop the thread after it drained its queue and return the documents.
    ///
    /// Returns `None` if the thread panicked.
    pub fn shutdown(mut self) -> Option<MemoryDocuments> {
        self.stop()
    }

    fn stop(&mut self) -> Option<MemoryDocuments> {
        let join = self.join.take()?;
        let _ = self.cmd_tx.send(WorkerCmd::Shutdown);
        match join.join() {
            Ok(docs) => Some(docs),
            Err(_) => {
                error!("document backend thread panicked");
                None
            }
        }
    }
}

impl Drop for DocumentWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl BackendHandle {
    /// Next message, if one is waiting.
    pub fn try_recv(&self) -> Option<BackendMessage> {
        self.msg_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BackendMessage> {
        match self.msg_rx.recv_timeout(timeout) {
            Ok(message) => Some(message),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                debug!(client = self.client, "backend message channel closed");
                None
            }
        }
    }

    /// Every message waiting right now.
    pub fn drain(&self) -> Vec<BackendMessage> {
        self.msg_rx.try_iter().collect()
    }

    /// Receiver side, for hosts that `select!` over several channels.
    pub fn messages(&self) -> &Receiver<BackendMessage> {
        &self.msg_rx
    }
}

impl DocumentBackend for BackendHandle {
    fn submit(&mut self, ticket: Ticket, request: BackendRequest) -> Result<(), BackendError> {
        self.cmd_tx
            .send(WorkerCmd::Submit {
                client: self.client,
                ticket,
                request,
            })
            .map_err(|_| BackendError::Unavailable("document backend stopped".to_string()))
    }

    fn echoes_writes(&self) -> bool {
        true
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WorkerCmd::Disconnect(self.client));
    }
}

fn run(mut docs: MemoryDocuments, cmd_rx: Receiver<WorkerCmd>) -> MemoryDocuments {
    let mut clients: HashMap<ClientId, Sender<BackendMessage>> = HashMap::new();
    for cmd in cmd_rx.iter() {
        match cmd {
            WorkerCmd::Connect { client, tx } => {
                debug!(client, "client connected");
                clients.insert(client, tx);
            }
            WorkerCmd::Disconnect(client) => {
                debug!(client, "client disconnected");
                clients.remove(&client);
            }
            WorkerCmd::Submit {
                client,
                ticket,
                request,
            } => {
                let result = docs.execute(&request);
                match &result {
                    Ok(_) => debug!(
                        client,
                        kind = ?ticket.kind,
                        version = ticket.version,
                        document = %ticket.document,
                        "request served"
                    ),
                    Err(err) => warn!(
                        client,
                        kind = ?ticket.kind,
                        document = %ticket.document,
                        error = %err,
                        "request failed"
                    ),
                }
                let notification = match (&result, request.is_mutation()) {
                    (Ok(BackendReply::LineCount(total_lines)), true) => {
                        Some(BackendNotification::LinesChanged {
                            id: request.document().clone(),
                            total_lines: *total_lines,
                        })
                    }
                    _ => None,
                };

                let response = BackendMessage::Response(BackendResponse { ticket, result });
                if let Some(tx) = clients.get(&client)
                    && tx.send(response).is_err()
                {
                    clients.remove(&client);
                }
                if let Some(notification) = notification {
                    broadcast(&mut clients, notification);
                }
            }
            WorkerCmd::Shutdown => break,
        }
    }
    info!("document backend stopped");
    docs
}

fn broadcast(
    clients: &mut HashMap<ClientId, Sender<BackendMessage>>,
    notification: BackendNotification,
) {
    clients.retain(|client, tx| {
        let delivered = tx
            .send(BackendMessage::Notification(notification.clone()))
            .is_ok();
        if !delivered {
            debug!(client = *client, "dropping disconnected client");
        }
        delivered
    });
}
