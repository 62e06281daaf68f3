use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use sp_audio::dsp::trim_silence;
use sp_audio::mel::{mel_spectrogram, mfcc_mean};

const SR: u32 = 48_000;

fn clip() -> Vec<f32> {
    (0..SR as usize * 5)
        .map(|i| {
            let t = i as f32 / SR as f32;
            0.4 * (2.0 * std::f32::consts::PI * 120.0 * t).sin()
                + 0.1 * (2.0 * std::f32::consts::PI * 1800.0 * t).sin()
        })
        .collect()
}

fn bench_features(c: &mut Criterion) {
    let samples = clip();

    c.bench_function("trim_silence_5s", |b| {
        b.iter(|| trim_silence(black_box(&samples), 30.0).len());
    });
    c.bench_function("mfcc_mean_5s", |b| {
        b.iter(|| mfcc_mean(black_box(&samples), SR, 2048, 512, 128, 40));
    });
    c.bench_function("mel_spectrogram_5s", |b| {
        b.iter(|| mel_spectrogram(black_box(&samples), SR, 2048, 512, 128, 8000.0));
    });
}

criterion_group!(benches, bench_features);
criterion_main!(benches);
