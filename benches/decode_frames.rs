/// Benchmarks for the per-frame hot path: decoding a broadcast frame and
/// fanning it out to listeners.
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stats_channel::types::{DetectionCounts, StatsFrame};
use stats_channel::ws::{Event, EventKind, JsonParser, ListenerRegistry, MessageParser as _};

const COUNTS_FRAME: &str = r#"{
    "classCounters": {"Bus": 12, "Car": 431, "Motorcycle": 57, "Truck": 38, "Van": 64},
    "heavyVehicles": 50,
    "lightVehicles": 552
}"#;

const STATUS_FRAME: &str = r#"{"status": "connected", "message": "WebSocket is active"}"#;

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames/decode");

    group.throughput(Throughput::Bytes(COUNTS_FRAME.len() as u64));
    group.bench_function("DetectionCounts", |b| {
        b.iter(|| {
            let _: DetectionCounts = serde_json::from_str(std::hint::black_box(COUNTS_FRAME))
                .expect("Deserialization should succeed");
        });
    });

    group.bench_function("StatsFrame::Counts", |b| {
        b.iter(|| {
            let _: StatsFrame = serde_json::from_str(std::hint::black_box(COUNTS_FRAME))
                .expect("Deserialization should succeed");
        });
    });

    let parser = JsonParser::<StatsFrame>::new();
    group.bench_function("JsonParser<StatsFrame>", |b| {
        b.iter(|| {
            parser
                .parse(std::hint::black_box(COUNTS_FRAME))
                .expect("Deserialization should succeed")
        });
    });

    group.throughput(Throughput::Bytes(STATUS_FRAME.len() as u64));
    group.bench_function("StatsFrame::Status", |b| {
        b.iter(|| {
            let _: StatsFrame = serde_json::from_str(std::hint::black_box(STATUS_FRAME))
                .expect("Deserialization should succeed");
        });
    });

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("frames/fan_out");
    let frame: StatsFrame = serde_json::from_str(COUNTS_FRAME).expect("valid frame");
    let event = Event::Message(frame);

    for listeners in [1_usize, 8, 64] {
        let registry = Arc::new(ListenerRegistry::new());
        let total = Arc::new(AtomicU64::new(0));
        for _ in 0..listeners {
            let total = Arc::clone(&total);
            registry.add(EventKind::Message, move |event: &Event<StatsFrame>| {
                if let Event::Message(StatsFrame::Counts(counts)) = event {
                    total.fetch_add(counts.heavy_vehicles, Ordering::Relaxed);
                }
            });
        }

        group.throughput(Throughput::Elements(listeners as u64));
        group.bench_with_input(
            BenchmarkId::new("notify", listeners),
            &registry,
            |b, registry| {
                b.iter(|| registry.notify(std::hint::black_box(&event)));
            },
        );
    }

    group.finish();
}

criterion_group!(frame_benches, bench_decode, bench_fan_out);
criterion_main!(frame_benches);
