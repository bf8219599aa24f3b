use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use live_media_client::codec::decoder::decode_pcm16;
use live_media_client::codec::PcmEncoder;
use live_media_client::constants::CAPTURE_BLOCK_SIZE;

fn sine_block(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / 16_000.0).sin() * 0.8)
        .collect()
}

fn bench_encode(c: &mut Criterion) {
    let block = sine_block(CAPTURE_BLOCK_SIZE);
    let mut group = c.benchmark_group("pcm_encode");
    group.throughput(Throughput::Elements(CAPTURE_BLOCK_SIZE as u64));

    group.bench_function("encode", |b| {
        let mut encoder = PcmEncoder::new(CAPTURE_BLOCK_SIZE);
        b.iter(|| encoder.encode(black_box(&block)))
    });
    group.bench_function("encode_base64", |b| {
        let mut encoder = PcmEncoder::new(CAPTURE_BLOCK_SIZE);
        b.iter(|| encoder.encode_base64(black_box(&block)))
    });
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("pcm_decode");
    for samples in [1024usize, 4800, 24_000] {
        let mut encoder = PcmEncoder::new(samples);
        let bytes = encoder.encode(&sine_block(samples));
        group.throughput(Throughput::Elements(samples as u64));
        group.bench_with_input(BenchmarkId::from_parameter(samples), &bytes, |b, bytes| {
            b.iter(|| decode_pcm16(black_box(bytes)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
