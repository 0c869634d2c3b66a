use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use editor_sync::coords::{code_unit_to_scalar, line_column_to_offset, offset_to_line_column};
use editor_sync::{DocumentId, MemoryDocuments, SegmentCache, build_diff};

fn large_text(line_count: usize) -> String {
    let mut out = String::with_capacity(line_count * 64);
    for i in 0..line_count {
        out.push_str(&format!(
            "{i:06} the quick brown fox jumps over the lazy dog (editor-sync benchmark line)\n"
        ));
    }
    // Remove the final '\n' to avoid creating an extra trailing empty line.
    out.pop();
    out
}

fn bench_diff_single_keystroke(c: &mut Criterion) {
    let old = large_text(50_000);
    let middle = old.len() / 2;
    let mut new = old.clone();
    new.insert(middle, 'x');

    c.bench_function("diff/single_keystroke_50k_lines", |b| {
        b.iter(|| black_box(build_diff(black_box(&old), black_box(&new))))
    });
}

fn bench_diff_windowed_segment(c: &mut Criterion) {
    let old = large_text(450);
    let mut new = old.clone();
    new.insert_str(old.len() / 3, "inserted\nlines\n");

    c.bench_function("diff/windowed_segment_line_replace", |b| {
        b.iter(|| {
            let diff = build_diff(&old, &new).unwrap();
            black_box(diff.to_line_replace(&old, &new))
        })
    });
}

fn bench_coordinate_mapping(c: &mut Criterion) {
    let text = large_text(20_000);
    let offset = text.len() / 2;

    c.bench_function("coords/offset_round_trip_20k_lines", |b| {
        b.iter(|| {
            let lc = offset_to_line_column(black_box(&text), offset);
            black_box(line_column_to_offset(&text, lc.line, lc.column))
        })
    });

    c.bench_function("coords/code_unit_to_scalar_20k_lines", |b| {
        b.iter(|| black_box(code_unit_to_scalar(black_box(&text), offset)))
    });
}

fn bench_chunk_fetch(c: &mut Criterion) {
    let id = DocumentId::new("bench");
    let mut docs = MemoryDocuments::new();
    docs.insert(id.clone(), &large_text(100_000));

    c.bench_function("segment/chunk_fetch_450_lines", |b| {
        b.iter_batched(
            || SegmentCache::new(true, 200, 100_000),
            |mut cache| {
                let plan = cache.on_viewport(60_000..60_050).unwrap();
                let reply = docs.execute(&editor_sync::BackendRequest::ReadChunk {
                    id: id.clone(),
                    start_line: plan.lines.start,
                    end_line: plan.lines.end,
                });
                black_box(cache.apply(plan.version, reply))
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench_diff_single_keystroke,
    bench_diff_windowed_segment,
    bench_coordinate_mapping,
    bench_chunk_fetch
);
criterion_main!(benches);
