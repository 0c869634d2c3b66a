use editor_sync::coords::{
    code_unit_to_scalar, display_to_text_offset, from_display_text, line_column_to_offset,
    line_count, offset_to_line_column, placeholder_offset, scalar_to_code_unit,
    text_to_display_offset, to_display_text, utf16_len,
};
use editor_sync::diff::{TextDiff, apply_diff, build_diff};
use editor_sync::{BackendReply, BackendRequest, DocumentId, MemoryDocuments, WHOLE_DOCUMENT};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[char] = &[
    'a', 'b', ' ', '\n', '\r', '\u{200B}', '\u{2028}', 'é', '中', '😀', '(', ')',
];

fn random_text(rng: &mut StdRng, max_len: usize) -> String {
    let len = rng.gen_range(0..=max_len);
    (0..len)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())])
        .collect()
}

fn mutate(rng: &mut StdRng, text: &str) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    for _ in 0..rng.gen_range(1..4) {
        match rng.gen_range(0..3) {
            0 if !chars.is_empty() => {
                let at = rng.gen_range(0..chars.len());
                chars.remove(at);
            }
            1 => {
                let at = rng.gen_range(0..=chars.len());
                chars.insert(at, ALPHABET[rng.gen_range(0..ALPHABET.len())]);
            }
            _ if !chars.is_empty() => {
                let at = rng.gen_range(0..chars.len());
                chars[at] = ALPHABET[rng.gen_range(0..ALPHABET.len())];
            }
            _ => chars.push('a'),
        }
    }
    chars.into_iter().collect()
}

#[test]
fn test_diff_inserting_one_char() {
    let diff = build_diff("alpha\nbeta\ngamma", "alpha\nXbeta\ngamma").unwrap();
    assert_eq!(
        diff,
        TextDiff {
            start: 6,
            end: 6,
            replacement: "X".to_string(),
        }
    );
}

#[test]
fn test_diff_identical_is_none() {
    assert_eq!(build_diff("", ""), None);
    assert_eq!(build_diff("same\ntext", "same\ntext"), None);
}

#[test]
fn test_diff_repeated_characters_do_not_overlap() {
    let diff = build_diff("aaa", "aaaa").unwrap();
    assert!(diff.start <= diff.end);
    assert_eq!(diff.end - diff.start, 0);
    assert_eq!(diff.replacement, "a");
    assert_eq!(apply_diff("aaa", &diff), "aaaa");

    let diff = build_diff("abab", "ab").unwrap();
    assert_eq!(diff.end - diff.start, 2);
    assert_eq!(apply_diff("abab", &diff), "ab");
}

#[test]
fn test_diff_never_splits_surrogate_pairs() {
    // U+1F600 and U+1F601 share their high surrogate.
    let diff = build_diff("x😀y", "x😁y").unwrap();
    assert_eq!(diff.start, 1);
    assert_eq!(diff.end, 3);
    assert_eq!(diff.replacement, "😁");
    let scalar = diff.to_scalar("x😀y");
    assert_eq!((scalar.start_scalar, scalar.end_scalar), (1, 2));
}

#[test]
fn test_diff_round_trip_random() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    for _ in 0..2_000 {
        let old = random_text(&mut rng, 40);
        let new = mutate(&mut rng, &old);
        match build_diff(&old, &new) {
            Some(diff) => {
                assert_ne!(old, new);
                assert!(diff.end <= utf16_len(&old));
                assert_eq!(apply_diff(&old, &diff), new, "old={old:?} new={new:?}");

                let lines = diff.to_line_replace(&old, &new);
                let mut rebuilt: Vec<&str> = old.split('\n').collect();
                let replacement: Vec<&str> = lines.new_text.split('\n').collect();
                assert_eq!(replacement.len(), lines.new_line_count);
                rebuilt.splice(lines.start_line..lines.end_line, replacement);
                assert_eq!(rebuilt.join("\n"), new, "old={old:?} new={new:?}");
            }
            None => assert_eq!(old, new),
        }
    }
}

#[test]
fn test_line_column_round_trip_random() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..2_000 {
        let text = random_text(&mut rng, 30);
        let len = utf16_len(&text);
        let offset = rng.gen_range(0..=len + 3);
        let lc = offset_to_line_column(&text, offset);
        assert!(lc.line >= 1);
        assert_eq!(
            line_column_to_offset(&text, lc.line, lc.column),
            offset.min(len),
            "text={text:?} offset={offset}"
        );
    }
}

#[test]
fn test_scalar_mapping_rounds_down_inside_pairs() {
    let text = "a😀b";
    assert_eq!(code_unit_to_scalar(text, 0), 0);
    assert_eq!(code_unit_to_scalar(text, 1), 1);
    assert_eq!(code_unit_to_scalar(text, 2), 1);
    assert_eq!(code_unit_to_scalar(text, 3), 2);
    assert_eq!(code_unit_to_scalar(text, 99), 3);
    assert_eq!(scalar_to_code_unit(text, 2), 3);
    assert_eq!(scalar_to_code_unit(text, 99), 4);
}

#[test]
fn test_display_placeholder_for_trailing_newline() {
    let text = "one\n";
    let display = to_display_text(text);
    assert_eq!(display, "one\n\u{200B}");
    assert_eq!(from_display_text(&display, placeholder_offset(text)), text);
    assert_eq!(display_to_text_offset(&display, placeholder_offset(text), 5), 4);
    assert_eq!(text_to_display_offset(text, 4), 4);

    assert_eq!(to_display_text("one"), "one");
    assert_eq!(to_display_text(""), "");
}

#[test]
fn test_display_round_trip_random() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..2_000 {
        let text = random_text(&mut rng, 30);
        let display = to_display_text(&text);
        let placeholder = placeholder_offset(&text);
        assert_eq!(from_display_text(&display, placeholder), text, "text={text:?}");

        let offset = rng.gen_range(0..=utf16_len(&text));
        let shown = text_to_display_offset(&text, offset);
        assert_eq!(
            display_to_text_offset(&display, placeholder, shown),
            offset,
            "text={text:?} offset={offset}"
        );
    }
}

#[test]
fn test_backend_and_mapper_agree_on_lines_random() {
    let mut rng = StdRng::seed_from_u64(0xc0ffee);
    let id = DocumentId::new("random");
    let mut docs = MemoryDocuments::new();
    for _ in 0..500 {
        let text = random_text(&mut rng, 30);
        docs.insert(id.clone(), &text);
        assert_eq!(docs.line_count(&id), Some(line_count(&text)), "text={text:?}");

        let reply = docs
            .execute(&BackendRequest::ReadChunk {
                id: id.clone(),
                start_line: 0,
                end_line: WHOLE_DOCUMENT,
            })
            .unwrap();
        let expected: Vec<String> = text.split('\n').map(str::to_string).collect();
        assert_eq!(reply, BackendReply::Lines(expected), "text={text:?}");
    }
}
