use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use wwvb::{classify::classify_width, config::Config, decode, frame::RawFrame};

fn bench_classify(c: &mut Criterion) {
    let config = Config::default();

    let mut group = c.benchmark_group("classify");
    group.throughput(Throughput::Elements(1));
    group.bench_function("width", |b| {
        b.iter(|| {
            let _ = classify_width(std::hint::black_box(512), &config);
        });
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    // 2023-06-15 23:59 with DST in effect
    let mut bits = [0u8; 60];
    for second in [1u8, 3, 5, 8, 12, 17, 18, 23, 26, 27, 31, 32, 37, 42, 47, 52, 53, 57, 58] {
        bits[second as usize] = 1;
    }
    let frame = RawFrame::from_bit_values(&bits);

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Elements(1));
    group.bench_function("frame", |b| {
        b.iter(|| {
            let _ = decode::decode(std::hint::black_box(&frame)).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_classify, bench_decode);
criterion_main!(benches);
