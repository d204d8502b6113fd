use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use xrefmark_engine::views::{DiffFile, split_diff_view};
use xrefmark_engine::{
    AnnotationSession, DiffSymbols, Envelope, FileSymbols, ResolutionResult, ResolveRequest,
    Symbol,
};

fn source(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("    let value_{i} = compute(input_{i}, {i});\n"))
        .collect()
}

fn symbols(lines: usize) -> Vec<Symbol> {
    (1..=lines as u32)
        .flat_map(|line| {
            [
                Symbol::new(line, 8..16, format!("https://x/value#{line}")),
                Symbol::new(line, 19..26, "https://x/compute"),
            ]
        })
        .collect()
}

fn bench_diff_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff_batch");
    group.sample_size(10);

    for lines in [100, 1000] {
        let text = source(lines);
        let doc = split_diff_view(&[DiffFile::new("main.rs", text.clone(), text)]);
        let diff = DiffSymbols {
            new_files: vec![FileSymbols {
                path: "main.rs".to_string(),
                syms: symbols(lines),
            }],
            old_files: vec![FileSymbols {
                path: "main.rs".to_string(),
                syms: symbols(lines),
            }],
        };

        group.throughput(Throughput::Elements(diff.symbol_count() as u64));
        group.bench_with_input(BenchmarkId::new("run_to_idle", lines), &diff, |b, diff| {
            b.iter(|| {
                let mut doc = doc.clone();
                let mut session = AnnotationSession::new();
                let stamped = session.begin_request(ResolveRequest::Commit {
                    slug: "o/r".to_string(),
                    commit: "c".to_string(),
                });
                session.receive(
                    &mut doc,
                    stamped.epoch,
                    Envelope::ok(ResolutionResult::Diff(diff.clone())),
                );
                let ticks = session.run_to_idle(std::hint::black_box(&mut doc));
                std::hint::black_box((ticks, doc));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_diff_batch);
criterion_main!(benches);
