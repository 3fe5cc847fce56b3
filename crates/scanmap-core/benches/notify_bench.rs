//! Criterion benchmarks for the notify record codec and the scancode map.
//!
//! Hook callbacks encode one record per observed event, so encode latency sits
//! on the input path of every hooked thread.
//!
//! Run with:
//! ```bash
//! cargo bench --package scanmap-core --bench notify_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use scanmap_core::notify::{
    Command64, FocusInfo, LockState, NotifyPayload, NotifyRecord, ShowInfo, ShowState,
};
use scanmap_core::{decode_record, encode_record, Hwnd32, ScancodeEntry, ScancodeMap};

// ── Record fixtures ───────────────────────────────────────────────────────────

fn make_focus() -> NotifyRecord {
    NotifyRecord::new(NotifyPayload::SetFocus(FocusInfo {
        thread_id: 4120,
        hwnd: Hwnd32(0x0002_04A6),
        class_name: "Notepad".to_string(),
        title_name: "Untitled - Notepad".to_string(),
    }))
}

fn make_lock_state() -> NotifyRecord {
    NotifyRecord::new(NotifyPayload::LockState(LockState {
        num_lock: true,
        caps_lock: false,
        ..LockState::default()
    }))
}

fn make_command64() -> NotifyRecord {
    NotifyRecord::new(NotifyPayload::Command64(Command64 {
        hwnd: Hwnd32(0x0001_0010),
        message: 0x0111,
        wparam: 40001,
        lparam: 0,
    }))
}

fn make_show() -> NotifyRecord {
    NotifyRecord::new(NotifyPayload::Show(ShowInfo {
        show: ShowState::Maximized,
        is_mdi: false,
    }))
}

fn make_log() -> NotifyRecord {
    NotifyRecord::new(NotifyPayload::Log("keymap reloaded: 14 entries".to_string()))
}

fn fixtures() -> Vec<(&'static str, NotifyRecord)> {
    vec![
        ("SetFocus", make_focus()),
        ("LockState", make_lock_state()),
        ("Sync", NotifyRecord::new(NotifyPayload::Sync)),
        ("ThreadAttach", NotifyRecord::new(NotifyPayload::ThreadAttach { thread_id: 7 })),
        ("Command64", make_command64()),
        ("Show", make_show()),
        ("Log", make_log()),
    ]
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_record");
    for (name, record) in fixtures() {
        group.bench_with_input(BenchmarkId::new("record", name), &record, |b, record| {
            b.iter(|| encode_record(black_box(record)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_record");
    for (name, record) in fixtures() {
        let bytes = encode_record(&record);
        group.bench_with_input(BenchmarkId::new("record", name), &bytes, |b, bytes| {
            b.iter(|| decode_record(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// Building and merging the table happens once per escape, but a large
/// configuration can carry a few hundred entries.
fn bench_scancode_merge(c: &mut Criterion) {
    let base = ScancodeMap::from_mappings((0..256u16).map(|i| ScancodeEntry::new(i + 1, 0x3A)));
    let fix = [ScancodeEntry::new(0x3A, 0x1D), ScancodeEntry::new(0x1D, 0x3A)];

    c.bench_function("scancode_merge_256", |b| {
        b.iter(|| black_box(&base).merged_with(black_box(&fix)).to_bytes())
    });
}

criterion_group!(benches, bench_encode, bench_decode, bench_scancode_merge);
criterion_main!(benches);
