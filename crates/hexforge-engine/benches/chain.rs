use criterion::{Criterion, black_box, criterion_group, criterion_main};
use hexforge_engine::editing::Editor;

fn bench_editor_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("editor_creation");
    group.sample_size(20);

    let content = vec![0x5Au8; 256 * 1024];
    group.bench_function("from_bytes", |b| {
        b.iter(|| {
            let editor = Editor::from_bytes(black_box(content.clone()));
            black_box(editor);
        });
    });

    group.finish();
}

fn bench_editor_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("editor_operations");
    group.sample_size(20);

    group.bench_function("scattered_inserts", |b| {
        b.iter(|| {
            let editor = Editor::from_bytes(vec![0u8; 64 * 1024]);
            for i in 0..100u64 {
                editor.insert_bytes(black_box(i * 37 % editor.len()), b"patch").unwrap();
            }
            black_box(editor.len());
        });
    });

    let editor = Editor::from_bytes(vec![0xA5u8; 64 * 1024]);
    for i in 0..100u64 {
        editor.insert_bytes(i * 61 % editor.len(), b"fragment").unwrap();
    }
    group.bench_function("read_all_fragmented", |b| {
        b.iter(|| {
            let bytes = editor.read_all().unwrap();
            black_box(bytes);
        });
    });

    group.bench_function("read_middle_fragmented", |b| {
        b.iter(|| {
            let bytes = editor.read_exact(black_box(20_000), 4096).unwrap();
            black_box(bytes);
        });
    });

    group.finish();
}

fn bench_undo_redo(c: &mut Criterion) {
    let mut group = c.benchmark_group("undo_redo");
    group.sample_size(20);

    group.bench_function("undo_redo_cycle", |b| {
        let editor = Editor::from_bytes(vec![0u8; 16 * 1024]);
        for i in 0..50u64 {
            editor.insert_bytes(i * 97 % editor.len(), b"edit").unwrap();
        }
        b.iter(|| {
            for _ in 0..10 {
                editor.undo().unwrap();
            }
            for _ in 0..10 {
                editor.redo().unwrap();
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_editor_creation,
    bench_editor_operations,
    bench_undo_redo
);
criterion_main!(benches);
