use criterion::{black_box, criterion_group, criterion_main, Criterion};

use broadcast_audio_sink::audio::format::{quantize, resample_linear, resampled_len};

fn bench_format(c: &mut Criterion) {
    // One 20 ms block at 8 kHz
    let block: Vec<f32> = (0..160).map(|i| (i as f32 * 0.05).sin()).collect();
    let mut pcm = vec![0i16; block.len()];
    let mut resampled = vec![0i16; resampled_len(block.len(), 8000, 16000) + 1];

    c.bench_function("quantize_160", |b| {
        b.iter(|| quantize(black_box(&block), &mut pcm))
    });

    quantize(&block, &mut pcm).unwrap();
    c.bench_function("resample_8k_to_16k_160", |b| {
        b.iter(|| resample_linear(black_box(&pcm), &mut resampled, 8000, 16000))
    });
}

criterion_group!(benches, bench_format);
criterion_main!(benches);
