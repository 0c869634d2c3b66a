//! Bracket and quote pair highlighting.
//!
//! Looks at the character before the caret first, then the one at the caret. Brackets are
//! matched with a balanced-depth scan over the materialized segment; quotes pair with the
//! nearest identical quote on the same line, with the opening/closing role decided by parity.

use crate::coords::{byte_to_code_unit, code_unit_to_byte};
use crate::selection::Caret;

/// Matched pair positions to highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairHighlight {
    /// Opening character.
    pub open: Caret,
    /// Closing character.
    pub close: Caret,
}

const BRACKETS: [(char, char); 3] = [('(', ')'), ('[', ']'), ('{', '}')];
const QUOTES: [char; 3] = ['"', '\'', '`'];

fn closing_for(ch: char) -> Option<char> {
    BRACKETS.iter().find(|(open, _)| *open == ch).map(|(_, close)| *close)
}

fn opening_for(ch: char) -> Option<char> {
    BRACKETS.iter().find(|(_, close)| *close == ch).map(|(open, _)| *open)
}

/// Find the pair touching `offset` (UTF-16 code units) in `text`.
///
/// Returns the code-unit offsets of the opening and closing characters. Lines longer than
/// `max_line_len` code units are never scanned.
pub fn find_pair(text: &str, offset: usize, max_line_len: usize) -> Option<(usize, usize)> {
    let at = code_unit_to_byte(text, offset);
    let (line_start, line_end) = line_bounds(text, at);
    if exceeds(&text[line_start..line_end], max_line_len) {
        return None;
    }

    let before = text[..at]
        .chars()
        .next_back()
        .map(|ch| (at - ch.len_utf8(), ch));
    let current = text[at..].chars().next().map(|ch| (at, ch));
    let (open, close) = before
        .into_iter()
        .chain(current)
        .find_map(|(byte, ch)| match_at(text, byte, ch))?;
    Some((byte_to_code_unit(text, open), byte_to_code_unit(text, close)))
}

/// Returns `true` once `line` is known to be longer than `limit` code units.
fn exceeds(line: &str, limit: usize) -> bool {
    if line.len() <= limit {
        return false;
    }
    let mut units = 0;
    line.chars().any(|ch| {
        units += ch.len_utf16();
        units > limit
    })
}

/// Byte bounds of the line containing byte `at`, without its newline.
fn line_bounds(text: &str, at: usize) -> (usize, usize) {
    let start = text[..at].rfind('\n').map_or(0, |nl| nl + 1);
    let end = text[at..].find('\n').map_or(text.len(), |nl| at + nl);
    (start, end)
}

fn match_at(text: &str, byte: usize, ch: char) -> Option<(usize, usize)> {
    if let Some(close) = closing_for(ch) {
        let mut depth = 0usize;
        for (i, c) in text[byte + ch.len_utf8()..].char_indices() {
            if c == ch {
                depth += 1;
            } else if c == close {
                if depth == 0 {
                    return Some((byte, byte + ch.len_utf8() + i));
                }
                depth -= 1;
            }
        }
        return None;
    }
    if let Some(open) = opening_for(ch) {
        let mut depth = 0usize;
        for (i, c) in text[..byte].char_indices().rev() {
            if c == ch {
                depth += 1;
            } else if c == open {
                if depth == 0 {
                    return Some((i, byte));
                }
                depth -= 1;
            }
        }
        return None;
    }
    if QUOTES.contains(&ch) {
        return match_quote(text, byte, ch);
    }
    None
}

fn is_quote_at(text: &str, byte: usize, quote: char) -> bool {
    text[byte..].starts_with(quote) && !text[..byte].ends_with('\\')
}

fn match_quote(text: &str, byte: usize, quote: char) -> Option<(usize, usize)> {
    if !is_quote_at(text, byte, quote) {
        return None;
    }
    let (start, end) = line_bounds(text, byte);
    let quotes_in = |from: usize, to: usize| {
        text[from..to]
            .match_indices(quote)
            .map(move |(i, _)| from + i)
            .filter(move |&i| is_quote_at(text, i, quote))
    };
    let preceding = quotes_in(start, byte).count();
    if preceding % 2 == 0 {
        quotes_in(byte + quote.len_utf8(), end)
            .next()
            .map(|close| (byte, close))
    } else {
        quotes_in(start, byte).last().map(|open| (open, byte))
    }
}

/// Pair highlight for the caret at `offset` in segment text `text` starting at `start_line`.
pub fn pair_highlight(
    text: &str,
    offset: usize,
    start_line: usize,
    max_line_len: usize,
) -> Option<PairHighlight> {
    let (open, close) = find_pair(text, offset, max_line_len)?;
    Some(PairHighlight {
        open: Caret::from_offset(text, open, start_line),
        close: Caret::from_offset(text, close, start_line),
    })
}
