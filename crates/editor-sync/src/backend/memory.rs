//! Rope-backed in-memory document store.
//!
//! Provides O(log N) line access and editing through [`ropey::Rope`], and implements every
//! request of the backend contract with its exact addressing rules:
//!
//! - point edits use scalar (`char`) indices
//! - line ranges are half-open and 0-based
//! - `N` newlines => `N + 1` lines; `\r`, `U+2028` and other breaks are line content
//! - [`WHOLE_DOCUMENT`] as `end_line` reads to the end

use super::{BackendError, BackendReply, BackendRequest, DocumentId, WHOLE_DOCUMENT};
use ropey::Rope;
use std::collections::HashMap;

/// A set of authoritative documents keyed by [`DocumentId`].
#[derive(Debug, Default, Clone)]
pub struct MemoryDocuments {
    docs: HashMap<DocumentId, Rope>,
}

impl MemoryDocuments {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a document.
    pub fn insert(&mut self, id: DocumentId, text: &str) {
        self.docs.insert(id, Rope::from_str(text));
    }

    /// Remove a document, returning `true` if it existed.
    pub fn remove(&mut self, id: &DocumentId) -> bool {
        self.docs.remove(id).is_some()
    }

    /// Returns `true` if the store holds `id`.
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    /// Full text of a document.
    pub fn text(&self, id: &DocumentId) -> Option<String> {
        self.docs.get(id).map(Rope::to_string)
    }

    /// Total line count of a document.
    pub fn line_count(&self, id: &DocumentId) -> Option<usize> {
        self.docs.get(id).map(Rope::len_lines)
    }

    /// Execute a request against the store.
    pub fn execute(&mut self, request: &BackendRequest) -> Result<BackendReply, BackendError> {
        match request {
            BackendRequest::ReadRange {
                id,
                start_line,
                end_line,
            } => {
                let rope = self.rope(id)?;
                let (start, end) = clamp_read(rope, id, *start_line, *end_line)?;
                Ok(BackendReply::Text(read_lines_text(rope, start, end)))
            }
            BackendRequest::ReadChunk {
                id,
                start_line,
                end_line,
            } => {
                let rope = self.rope(id)?;
                let (start, end) = clamp_read(rope, id, *start_line, *end_line)?;
                let lines = (start..end).map(|line| line_text(rope, line)).collect();
                Ok(BackendReply::Lines(lines))
            }
            BackendRequest::PointEdit {
                id,
                start_scalar,
                end_scalar,
                new_text,
            } => {
                let rope = self.rope_mut(id)?;
                let len = rope.len_chars();
                if start_scalar > end_scalar || *end_scalar > len {
                    return Err(BackendError::OutOfRange {
                        id: id.clone(),
                        start: *start_scalar,
                        end: *end_scalar,
                    });
                }
                rope.remove(*start_scalar..*end_scalar);
                rope.insert(*start_scalar, new_text);
                Ok(BackendReply::LineCount(rope.len_lines()))
            }
            BackendRequest::ReplaceLines {
                id,
                start_line,
                end_line,
                new_text,
            } => {
                let rope = self.rope_mut(id)?;
                replace_lines(rope, id, *start_line, *end_line, new_text)?;
                Ok(BackendReply::LineCount(rope.len_lines()))
            }
            BackendRequest::LineCount { id } => {
                Ok(BackendReply::LineCount(self.rope(id)?.len_lines()))
            }
        }
    }

    fn rope(&self, id: &DocumentId) -> Result<&Rope, BackendError> {
        self.docs
            .get(id)
            .ok_or_else(|| BackendError::UnknownDocument(id.clone()))
    }

    fn rope_mut(&mut self, id: &DocumentId) -> Result<&mut Rope, BackendError> {
        self.docs
            .get_mut(id)
            .ok_or_else(|| BackendError::UnknownDocument(id.clone()))
    }
}

fn clamp_read(
    rope: &Rope,
    id: &DocumentId,
    start_line: usize,
    end_line: usize,
) -> Result<(usize, usize), BackendError> {
    let total = rope.len_lines();
    let end = if end_line == WHOLE_DOCUMENT {
        total
    } else {
        end_line.min(total)
    };
    if start_line > end {
        return Err(BackendError::OutOfRange {
            id: id.clone(),
            start: start_line,
            end: end_line,
        });
    }
    Ok((start_line, end))
}

/// Text of a single line without its trailing newline.
fn line_text(rope: &Rope, line: usize) -> String {
    let mut text = rope.line(line).to_string();
    if text.ends_with('\n') {
        text.pop();
    }
    text
}

fn read_lines_text(rope: &Rope, start: usize, end: usize) -> String {
    if start >= end {
        return String::new();
    }
    let start_char = rope.line_to_char(start);
    let end_char = if end < rope.len_lines() {
        // Exclude the newline that terminates line `end - 1`.
        rope.line_to_char(end) - 1
    } else {
        rope.len_chars()
    };
    rope.slice(start_char..end_char).to_string()
}

fn replace_lines(
    rope: &mut Rope,
    id: &DocumentId,
    start_line: usize,
    end_line: usize,
    new_text: &str,
) -> Result<(), BackendError> {
    let total = rope.len_lines();
    if start_line > end_line || end_line > total {
        return Err(BackendError::OutOfRange {
            id: id.clone(),
            start: start_line,
            end: end_line,
        });
    }

    if start_line == total {
        // Append after the last line.
        let at = rope.len_chars();
        rope.insert(at, "\n");
        rope.insert(at + 1, new_text);
        return Ok(());
    }

    let start_char = rope.line_to_char(start_line);
    if end_line < total {
        let end_char = rope.line_to_char(end_line);
        rope.remove(start_char..end_char);
        rope.insert(start_char, "\n");
        rope.insert(start_char, new_text);
    } else {
        let end_char = rope.len_chars();
        rope.remove(start_char..end_char);
        rope.insert(start_char, new_text);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(text: &str) -> (MemoryDocuments, DocumentId) {
        let mut docs = MemoryDocuments::new();
        let id = DocumentId::new("doc");
        docs.insert(id.clone(), text);
        (docs, id)
    }

    #[test]
    fn test_read_range_and_chunk() {
        let (mut docs, id) = store("a\nb\nc\n");
        let reply = docs
            .execute(&BackendRequest::ReadRange {
                id: id.clone(),
                start_line: 1,
                end_line: 3,
            })
            .unwrap();
        assert_eq!(reply, BackendReply::Text("b\nc".to_string()));

        let reply = docs
            .execute(&BackendRequest::ReadChunk {
                id: id.clone(),
                start_line: 2,
                end_line: WHOLE_DOCUMENT,
            })
            .unwrap();
        assert_eq!(
            reply,
            BackendReply::Lines(vec!["c".to_string(), String::new()])
        );

        let reply = docs
            .execute(&BackendRequest::ReadRange {
                id,
                start_line: 0,
                end_line: WHOLE_DOCUMENT,
            })
            .unwrap();
        assert_eq!(reply, BackendReply::Text("a\nb\nc\n".to_string()));
    }

    #[test]
    fn test_point_edit_uses_scalar_indices() {
        let (mut docs, id) = store("😀a\nb");
        let reply = docs
            .execute(&BackendRequest::PointEdit {
                id: id.clone(),
                start_scalar: 1,
                end_scalar: 2,
                new_text: "x\ny".to_string(),
            })
            .unwrap();
        assert_eq!(reply, BackendReply::LineCount(3));
        assert_eq!(docs.text(&id).unwrap(), "😀x\ny\nb");
    }

    #[test]
    fn test_replace_lines_middle_end_and_append() {
        let (mut docs, id) = store("one\ntwo\nthree");
        docs.execute(&BackendRequest::ReplaceLines {
            id: id.clone(),
            start_line: 1,
            end_line: 2,
            new_text: "2a\n2b".to_string(),
        })
        .unwrap();
        assert_eq!(docs.text(&id).unwrap(), "one\n2a\n2b\nthree");

        docs.execute(&BackendRequest::ReplaceLines {
            id: id.clone(),
            start_line: 3,
            end_line: 4,
            new_text: "last".to_string(),
        })
        .unwrap();
        assert_eq!(docs.text(&id).unwrap(), "one\n2a\n2b\nlast");

        let reply = docs
            .execute(&BackendRequest::ReplaceLines {
                id: id.clone(),
                start_line: 4,
                end_line: 4,
                new_text: "tail".to_string(),
            })
            .unwrap();
        assert_eq!(reply, BackendReply::LineCount(5));
        assert_eq!(docs.text(&id).unwrap(), "one\n2a\n2b\nlast\ntail");
    }

    #[test]
    fn test_only_newline_breaks_lines() {
        let (mut docs, id) = store("a\rb\u{2028}c\u{85}d\n\u{0B}e\u{0C}\r\nf");
        assert_eq!(docs.line_count(&id), Some(3));
        let reply = docs
            .execute(&BackendRequest::ReadChunk {
                id: id.clone(),
                start_line: 0,
                end_line: WHOLE_DOCUMENT,
            })
            .unwrap();
        assert_eq!(
            reply,
            BackendReply::Lines(vec![
                "a\rb\u{2028}c\u{85}d".to_string(),
                "\u{0B}e\u{0C}\r".to_string(),
                "f".to_string(),
            ])
        );

        let reply = docs
            .execute(&BackendRequest::ReplaceLines {
                id: id.clone(),
                start_line: 0,
                end_line: 1,
                new_text: "aY\rb".to_string(),
            })
            .unwrap();
        assert_eq!(reply, BackendReply::LineCount(3));
        assert_eq!(docs.text(&id).unwrap(), "aY\rb\n\u{0B}e\u{0C}\r\nf");
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let (mut docs, id) = store("x");
        let err = docs
            .execute(&BackendRequest::PointEdit {
                id: id.clone(),
                start_scalar: 0,
                end_scalar: 5,
                new_text: String::new(),
            })
            .unwrap_err();
        assert!(matches!(err, BackendError::OutOfRange { .. }));

        let err = docs
            .execute(&BackendRequest::LineCount {
                id: DocumentId::new("missing"),
            })
            .unwrap_err();
        assert_eq!(err, BackendError::UnknownDocument(DocumentId::new("missing")));
    }
}
