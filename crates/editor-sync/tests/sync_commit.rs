use crossbeam_channel::Receiver;
use editor_sync::{
    BackendError, BackendNotification, BackendRequest, DocumentId, EditSurface, Editor,
    MemoryDocuments, QueuedBackend, QueuedRequest, SyncEvent, SyncOptions, TextSurface,
    TicketKind,
};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

struct Harness {
    editor: Editor<QueuedBackend, TextSurface>,
    docs: MemoryDocuments,
    events: Receiver<SyncEvent>,
    t0: Instant,
}

impl Harness {
    fn new(options: SyncOptions) -> Self {
        let mut editor = Editor::new(QueuedBackend::new(), TextSurface::new(), options);
        let events = editor.subscribe();
        Self {
            editor,
            docs: MemoryDocuments::new(),
            events,
            t0: Instant::now(),
        }
    }

    fn open(&mut self, name: &str, text: &str) -> DocumentId {
        let id = DocumentId::new(name);
        self.docs.insert(id.clone(), text);
        let total = self.docs.line_count(&id).unwrap();
        self.editor.open(id.clone(), total).unwrap();
        self.deliver_all();
        id
    }

    fn at(&self, ms: u64) -> Instant {
        self.t0 + Duration::from_millis(ms)
    }

    fn deliver_all(&mut self) {
        loop {
            let responses = self.editor.backend_mut().drain_with(&mut self.docs);
            if responses.is_empty() {
                break;
            }
            for response in responses {
                self.editor.handle_response(response);
            }
        }
    }

    fn take(&mut self, kind: TicketKind) -> QueuedRequest {
        self.editor.backend_mut().take_kind(kind).unwrap()
    }

    fn answer(&mut self, kind: TicketKind) -> BackendRequest {
        let queued = self.take(kind);
        let response = queued.answer(&mut self.docs);
        self.editor.handle_response(response);
        queued.request
    }

    fn type_at(&mut self, offset: usize, input: &str, now: Instant) {
        self.editor.surface_mut().move_caret(offset);
        self.editor.surface_mut().type_text(input);
        self.editor.on_text_changed(now).unwrap();
    }

    fn events(&self) -> Vec<SyncEvent> {
        self.events.try_iter().collect()
    }

    fn pending(&self, kind: TicketKind) -> usize {
        self.editor.backend().count_kind(kind)
    }
}

fn numbered_lines(count: usize) -> String {
    (0..count)
        .map(|i| format!("line {i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn windowed_options() -> SyncOptions {
    SyncOptions::default()
        .with_huge_line_threshold(100)
        .with_huge_window_buffer(10)
}

#[test]
fn test_single_keystroke_commits_point_edit() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "alpha\nbeta\ngamma");
    assert_eq!(h.editor.surface().text(), "alpha\nbeta\ngamma");
    h.events();

    h.type_at(6, "X", h.at(0));
    h.editor.tick(h.at(50));
    assert_eq!(h.pending(TicketKind::Commit), 0);

    h.editor.tick(h.at(200));
    let request = h.answer(TicketKind::Commit);
    assert_eq!(
        request,
        BackendRequest::PointEdit {
            id: id.clone(),
            start_scalar: 6,
            end_scalar: 6,
            new_text: "X".to_string(),
        }
    );
    assert_eq!(h.docs.text(&id).unwrap(), "alpha\nXbeta\ngamma");

    let session = h.editor.session(&id).unwrap();
    assert_eq!(session.sync().base_text(), "alpha\nXbeta\ngamma");
    assert!(!session.sync().is_in_flight());
    assert!(h.editor.is_dirty(&id));

    let events = h.events();
    assert!(events.contains(&SyncEvent::Committed {
        document: id.clone(),
        total_lines: 3,
    }));
    assert!(events.contains(&SyncEvent::DirtyChanged {
        document: id.clone(),
        dirty: true,
    }));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, SyncEvent::TokensStale { .. }))
    );

    h.editor.mark_saved(&id).unwrap();
    assert!(!h.editor.is_dirty(&id));
    assert_eq!(
        h.events(),
        vec![SyncEvent::DirtyChanged {
            document: id,
            dirty: false,
        }]
    );
}

#[test]
fn test_edits_during_commit_coalesce_into_one_followup() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "abc");

    h.type_at(3, "1", h.at(0));
    h.editor.tick(h.at(200));
    assert_eq!(h.pending(TicketKind::Commit), 1);

    h.type_at(4, "2", h.at(210));
    h.type_at(5, "3", h.at(220));
    h.editor.tick(h.at(500));
    // Still only the first commit travelling.
    assert_eq!(h.pending(TicketKind::Commit), 1);

    let first = h.answer(TicketKind::Commit);
    assert_eq!(
        first,
        BackendRequest::PointEdit {
            id: id.clone(),
            start_scalar: 3,
            end_scalar: 3,
            new_text: "1".to_string(),
        }
    );

    assert_eq!(h.pending(TicketKind::Commit), 1);
    let second = h.answer(TicketKind::Commit);
    assert_eq!(
        second,
        BackendRequest::PointEdit {
            id: id.clone(),
            start_scalar: 4,
            end_scalar: 4,
            new_text: "23".to_string(),
        }
    );
    assert_eq!(h.pending(TicketKind::Commit), 0);
    assert_eq!(h.docs.text(&id).unwrap(), "abc123");
}

#[test]
fn test_failed_commit_keeps_edits_and_resends_larger_delta() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "alpha\nbeta\ngamma");
    h.events();

    h.type_at(6, "X", h.at(0));
    h.editor.tick(h.at(200));
    let queued = h.take(TicketKind::Commit);
    h.editor
        .handle_response(queued.fail(BackendError::Unavailable("offline".to_string())));

    assert_eq!(h.editor.surface().text(), "alpha\nXbeta\ngamma");
    assert_eq!(h.docs.text(&id).unwrap(), "alpha\nbeta\ngamma");
    assert_eq!(
        h.editor.session(&id).unwrap().sync().base_text(),
        "alpha\nbeta\ngamma"
    );
    assert!(h.events().iter().any(|event| matches!(
        event,
        SyncEvent::CommitFailed { document, message } if *document == id && message.contains("offline")
    )));
    assert_eq!(h.pending(TicketKind::Commit), 0);

    h.type_at(7, "Y", h.at(300));
    h.editor.tick(h.at(500));
    let retry = h.answer(TicketKind::Commit);
    assert_eq!(
        retry,
        BackendRequest::PointEdit {
            id: id.clone(),
            start_scalar: 6,
            end_scalar: 6,
            new_text: "XY".to_string(),
        }
    );
    assert_eq!(h.docs.text(&id).unwrap(), "alpha\nXYbeta\ngamma");
}

#[test]
fn test_rejected_submission_counts_as_failure() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "one");
    h.events();

    h.editor
        .backend_mut()
        .reject_next(BackendError::Unavailable("queue full".to_string()));
    h.type_at(3, "!", h.at(0));
    h.editor.tick(h.at(200));

    assert_eq!(h.pending(TicketKind::Commit), 0);
    assert!(!h.editor.session(&id).unwrap().sync().is_in_flight());
    assert!(
        h.events()
            .iter()
            .any(|event| matches!(event, SyncEvent::CommitFailed { .. }))
    );

    h.editor.flush().unwrap();
    h.answer(TicketKind::Commit);
    assert_eq!(h.docs.text(&id).unwrap(), "one!");
}

#[test]
fn test_echo_of_own_commit_is_ignored() {
    let mut h = Harness::new(SyncOptions::default());
    h.editor.backend_mut().set_echoes_writes(true);
    let id = h.open("notes", "alpha\nbeta\ngamma");
    h.type_at(0, "> ", h.at(0));
    h.editor.tick(h.at(200));
    h.answer(TicketKind::Commit);
    h.events();

    h.editor
        .handle_notification(BackendNotification::LinesChanged {
            id: id.clone(),
            total_lines: 3,
        });

    assert_eq!(h.pending(TicketKind::Fetch), 0);
    assert!(
        !h.events()
            .iter()
            .any(|event| matches!(event, SyncEvent::ExternalReload { .. }))
    );
    assert_eq!(h.editor.surface().text(), "> alpha\nbeta\ngamma");
}

#[test]
fn test_external_change_reloads_and_keeps_caret() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "alpha\nbeta\ngamma");
    // Line 2, column 3.
    h.editor.surface_mut().move_caret(8);
    h.editor.on_selection_changed().unwrap();
    h.events();

    h.docs.insert(id.clone(), "zero\nalpha\nbeta\ngamma");
    h.editor
        .handle_notification(BackendNotification::LinesChanged {
            id: id.clone(),
            total_lines: 4,
        });
    assert_eq!(
        h.events(),
        vec![SyncEvent::ExternalReload {
            document: id.clone(),
            total_lines: 4,
        }]
    );
    h.deliver_all();

    assert_eq!(h.editor.surface().text(), "zero\nalpha\nbeta\ngamma");
    assert_eq!(h.editor.surface().selection().focus, 7);
    assert_eq!(h.editor.session(&id).unwrap().total_lines(), 4);
    assert!(h.events().contains(&SyncEvent::SegmentReplaced {
        document: id,
        lines: 0..4,
    }));
}

#[test]
fn test_external_change_waits_for_in_flight_commit() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "alpha\nbeta\ngamma");
    h.type_at(6, "X", h.at(0));
    h.editor.tick(h.at(200));
    h.events();

    h.editor
        .handle_notification(BackendNotification::LinesChanged {
            id: id.clone(),
            total_lines: 3,
        });
    assert_eq!(h.pending(TicketKind::Fetch), 0);
    assert!(h.events().is_empty());
    assert!(h.editor.session(&id).unwrap().sync().has_deferred_reload());

    h.answer(TicketKind::Commit);
    assert!(h.events().iter().any(|event| matches!(
        event,
        SyncEvent::ExternalReload { document, .. } if *document == id
    )));
    assert_eq!(h.pending(TicketKind::Fetch), 1);

    h.deliver_all();
    assert_eq!(h.editor.surface().text(), "alpha\nXbeta\ngamma");
    assert!(!h.editor.session(&id).unwrap().sync().has_deferred_reload());
}

#[test]
fn test_refresh_is_deferred_while_edits_are_unsent() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "abc");
    h.type_at(3, "d", h.at(0));

    h.editor.refresh().unwrap();
    assert_eq!(h.pending(TicketKind::Fetch), 0);

    h.editor.tick(h.at(200));
    h.deliver_all();
    assert_eq!(h.docs.text(&id).unwrap(), "abcd");
    assert_eq!(h.editor.surface().text(), "abcd");
    assert!(!h.editor.session(&id).unwrap().sync().has_deferred_reload());
}

#[test]
fn test_windowed_commit_replaces_lines_with_segment_offset() {
    let mut h = Harness::new(windowed_options());
    let id = h.open("big", &numbered_lines(300));
    let session = h.editor.session(&id).unwrap();
    assert!(session.is_windowed());
    assert_eq!(session.segment().unwrap().lines(), 0..60);

    h.editor.on_viewport_changed(100..130).unwrap();
    h.deliver_all();
    let session = h.editor.session(&id).unwrap();
    assert_eq!(session.segment().unwrap().lines(), 90..140);
    assert_eq!(h.editor.surface().scroll(), 10);

    // "line 95" is the sixth line of the segment.
    h.type_at(5 * "line 9x\n".len(), "X", h.at(0));
    h.editor.tick(h.at(200));
    assert_eq!(h.pending(TicketKind::Commit), 0);
    h.editor.tick(h.at(500));

    let request = h.answer(TicketKind::Commit);
    assert_eq!(
        request,
        BackendRequest::ReplaceLines {
            id: id.clone(),
            start_line: 95,
            end_line: 96,
            new_text: "Xline 95".to_string(),
        }
    );
    let text = h.docs.text(&id).unwrap();
    assert_eq!(text.lines().nth(95), Some("Xline 95"));
    assert_eq!(h.docs.line_count(&id), Some(300));
    assert_eq!(h.editor.session(&id).unwrap().total_lines(), 300);
}

#[test]
fn test_leaving_window_flushes_before_fetching() {
    let mut h = Harness::new(windowed_options());
    let id = h.open("big", &numbered_lines(300));
    h.editor.on_viewport_changed(100..130).unwrap();
    h.deliver_all();

    h.type_at(5 * "line 9x\n".len(), "X", h.at(0));
    h.editor.on_viewport_changed(250..280).unwrap();

    // The commit goes out first; the fetch waits for it.
    assert_eq!(h.pending(TicketKind::Commit), 1);
    assert_eq!(h.pending(TicketKind::Fetch), 0);

    h.answer(TicketKind::Commit);
    assert_eq!(h.pending(TicketKind::Fetch), 1);
    h.deliver_all();

    let session = h.editor.session(&id).unwrap();
    assert_eq!(session.segment().unwrap().lines(), 240..290);
    assert!(h.editor.surface().text().starts_with("line 240\n"));
    assert_eq!(h.docs.text(&id).unwrap().lines().nth(95), Some("Xline 95"));
}

#[test]
fn test_composition_locks_window_until_unlock_delay() {
    let mut h = Harness::new(windowed_options());
    let id = h.open("big", &numbered_lines(300));
    h.editor.on_viewport_changed(100..130).unwrap();
    h.deliver_all();

    h.editor.composition_start().unwrap();
    h.editor.on_viewport_changed(250..280).unwrap();
    assert_eq!(h.pending(TicketKind::Fetch), 0);
    assert!(h.editor.session(&id).unwrap().cache().is_locked());

    h.editor.surface_mut().move_caret(5 * "line 9x\n".len());
    h.editor.surface_mut().type_text("あ");
    h.editor.composition_end(h.at(0)).unwrap();
    h.editor.tick(h.at(100));
    assert_eq!(h.pending(TicketKind::Fetch), 0);
    assert_eq!(h.pending(TicketKind::Commit), 0);

    h.editor.tick(h.at(200));
    assert!(!h.editor.session(&id).unwrap().cache().is_locked());
    h.deliver_all();
    // The edit has not been committed yet, so the new window is held back.
    assert_eq!(
        h.editor.session(&id).unwrap().segment().unwrap().lines(),
        90..140
    );

    h.editor.tick(h.at(500));
    h.deliver_all();
    assert_eq!(
        h.editor.session(&id).unwrap().segment().unwrap().lines(),
        240..290
    );
    assert_eq!(h.docs.text(&id).unwrap().lines().nth(95), Some("あline 95"));
}

#[test]
fn test_close_flushes_and_waits_for_commit() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "alpha");
    h.type_at(5, "!", h.at(0));

    h.editor.close(&id).unwrap();
    assert!(!h.editor.is_open(&id));
    assert!(h.editor.session(&id).unwrap().is_closing());
    assert_eq!(h.editor.surface().text(), "");
    assert_eq!(h.pending(TicketKind::Commit), 1);

    h.deliver_all();
    assert!(h.editor.session(&id).is_none());
    assert!(h.editor.tabs().get(&id).is_none());
    assert_eq!(h.docs.text(&id).unwrap(), "alpha!");
}

#[test]
fn test_response_for_closed_document_is_dropped() {
    let mut h = Harness::new(SyncOptions::default());
    let a = DocumentId::new("a");
    let b = DocumentId::new("b");
    h.docs.insert(a.clone(), "first document");
    h.docs.insert(b.clone(), "second document");

    h.editor.open(a.clone(), 1).unwrap();
    h.editor.open(b.clone(), 1).unwrap();
    h.editor.close(&a).unwrap();
    assert_eq!(h.pending(TicketKind::Fetch), 2);

    h.deliver_all();
    assert!(h.editor.session(&a).is_none());
    assert_eq!(h.editor.active_document(), Some(&b));
    assert_eq!(h.editor.surface().text(), "second document");
}

#[test]
fn test_commands_without_active_document_fail() {
    let mut h = Harness::new(SyncOptions::default());
    assert!(h.editor.flush().is_err());
    assert!(h.editor.on_text_changed(h.at(0)).is_err());
    assert!(h.editor.switch_to(&DocumentId::new("missing")).is_err());
}

#[test]
fn test_options_deserialize_from_partial_table() {
    let options: SyncOptions =
        serde_json::from_str(r#"{ "debounce_ms": 50, "plain_text": true }"#).unwrap();
    assert_eq!(options.debounce_ms, 50);
    assert!(options.plain_text);
    assert!(!options.pair_highlight_enabled());
    assert_eq!(
        options.huge_line_threshold,
        SyncOptions::default().huge_line_threshold
    );
    assert_eq!(options.debounce_for(false), Duration::from_millis(50));
}

#[test]
fn test_zero_width_space_in_document_survives_edits() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("zw", "a\u{200B}b");
    assert_eq!(h.editor.surface().text(), "a\u{200B}b");

    h.type_at(3, "X", h.at(0));
    assert_eq!(h.editor.surface().text(), "a\u{200B}bX");
    h.editor.tick(h.at(200));
    let request = h.answer(TicketKind::Commit);
    assert_eq!(
        request,
        BackendRequest::PointEdit {
            id: id.clone(),
            start_scalar: 3,
            end_scalar: 3,
            new_text: "X".to_string(),
        }
    );
    assert_eq!(h.docs.text(&id).unwrap(), "a\u{200B}bX");
}

#[test]
fn test_typing_after_placeholder_lands_on_trailing_line() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("trail", "a\n");
    assert_eq!(h.editor.surface().text(), "a\n\u{200B}");

    h.type_at(3, "x", h.at(0));
    assert_eq!(h.editor.surface().text(), "a\nx");
    assert_eq!(h.editor.surface().selection().focus, 3);

    h.editor.tick(h.at(200));
    h.answer(TicketKind::Commit);
    assert_eq!(h.docs.text(&id).unwrap(), "a\nx");

    // A real zero-width space typed on a fresh trailing line is content.
    h.type_at(3, "\n", h.at(300));
    assert_eq!(h.editor.surface().text(), "a\nx\n\u{200B}");
    h.type_at(4, "\u{200B}", h.at(310));
    h.editor.tick(h.at(600));
    h.answer(TicketKind::Commit);
    assert_eq!(h.docs.text(&id).unwrap(), "a\nx\n\u{200B}");
}

#[test]
fn test_lone_carriage_return_is_not_a_line_break() {
    let options = SyncOptions::default()
        .with_huge_line_threshold(2)
        .with_huge_window_buffer(10);
    let mut h = Harness::new(options);
    let id = h.open("cr", "a\rb\nc");
    assert!(h.editor.session(&id).unwrap().is_windowed());
    assert_eq!(h.editor.surface().text(), "a\rb\nc");

    h.type_at(1, "Y", h.at(0));
    h.editor.tick(h.at(500));
    let request = h.answer(TicketKind::Commit);
    assert_eq!(
        request,
        BackendRequest::ReplaceLines {
            id: id.clone(),
            start_line: 0,
            end_line: 1,
            new_text: "aY\rb".to_string(),
        }
    );
    assert_eq!(h.docs.text(&id).unwrap(), "aY\rb\nc");
    assert_eq!(h.editor.session(&id).unwrap().total_lines(), 2);
}

#[test]
fn test_external_change_after_confirmed_commit_reloads() {
    let mut h = Harness::new(SyncOptions::default());
    let id = h.open("notes", "one\ntwo");
    h.type_at(0, "X", h.at(0));
    h.editor.tick(h.at(200));
    h.answer(TicketKind::Commit);
    h.events();

    // This backend never echoes our own writes; the next notification is someone else's.
    h.docs.insert(id.clone(), "Xone\ntwo\nthree");
    h.editor
        .handle_notification(BackendNotification::LinesChanged {
            id: id.clone(),
            total_lines: 3,
        });
    assert_eq!(h.pending(TicketKind::Fetch), 1);
    assert!(h.events().contains(&SyncEvent::ExternalReload {
        document: id.clone(),
        total_lines: 3,
    }));
    h.deliver_all();
    assert_eq!(h.editor.surface().text(), "Xone\ntwo\nthree");

    // Same line count, but no commit of ours is waiting for an echo.
    h.docs.insert(id.clone(), "Xone\nTWO\nthree");
    h.editor
        .handle_notification(BackendNotification::LinesChanged {
            id: id.clone(),
            total_lines: 3,
        });
    h.deliver_all();
    assert_eq!(h.editor.surface().text(), "Xone\nTWO\nthree");
}
