//! Windowed editing against the threaded backend
//!
//! Opens a large generated document, scrolls far into it, types a line and lets the debounce
//! commit it. Run with `RUST_LOG=editor_sync=debug` to watch fetch and commit traffic.

use editor_sync::{
    DocumentId, EditSurface, Editor, MemoryDocuments, SyncEvent, SyncOptions, TextSurface,
};
use editor_sync_worker::{BackendHandle, spawn_backend};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

fn pump(editor: &mut Editor<BackendHandle, TextSurface>) {
    while let Some(message) = editor.backend().recv_timeout(Duration::from_millis(100)) {
        editor.handle_message(message);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("editor_sync=info,editor_sync_worker=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let id = DocumentId::new("huge.log");
    let total = 30_000;
    let text = (0..total)
        .map(|i| format!("{i:05} entry"))
        .collect::<Vec<_>>()
        .join("\n");
    let mut docs = MemoryDocuments::new();
    docs.insert(id.clone(), &text);

    let worker = spawn_backend(docs)?;
    let mut editor = Editor::new(worker.connect(), TextSurface::new(), SyncOptions::default());
    let events = editor.subscribe();

    editor.open(id.clone(), total)?;
    pump(&mut editor);
    if let Some(session) = editor.session(&id) {
        println!("mode: {:?}, segment: {:?}", session.mode(), session.segment().map(|s| s.lines()));
    }

    editor.on_viewport_changed(12_000..12_040)?;
    pump(&mut editor);
    let start_line = editor.session(&id).map_or(0, |session| session.start_line());
    println!("scrolled: segment starts at line {start_line}");

    // Type at the top of the visible area.
    let scroll = editor.surface().scroll();
    let offset = editor
        .surface()
        .text()
        .split('\n')
        .take(scroll)
        .map(|line| line.encode_utf16().count() + 1)
        .sum::<usize>();
    let now = Instant::now();
    editor.surface_mut().move_caret(offset);
    editor.surface_mut().type_text("edited: ");
    editor.on_text_changed(now)?;
    println!("caret: {:?}", editor.caret()?);

    if let Some(deadline) = editor.next_deadline() {
        editor.tick(deadline);
    }
    pump(&mut editor);

    for event in events.try_iter() {
        match event {
            SyncEvent::Committed { total_lines, .. } => println!("committed ({total_lines} lines)"),
            SyncEvent::DirtyChanged { dirty, .. } => println!("dirty: {dirty}"),
            other => println!("event: {other:?}"),
        }
    }

    editor.close(&id)?;
    pump(&mut editor);
    drop(editor);

    if let Some(docs) = worker.shutdown()
        && let Some(text) = docs.text(&id)
    {
        println!("line 12000 now reads: {:?}", text.lines().nth(12_000));
    }
    Ok(())
}
