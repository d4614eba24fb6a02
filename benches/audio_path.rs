//! Per-frame costs on the capture path. These run for every microphone read,
//! so they have to stay well under real time on a Raspberry Pi.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use voiceclock::audio::resample::{SUPPORTED_SAMPLE_RATES, resample};
use voiceclock::audio::{Vad, VadConfig, calculate_rms};
use voiceclock::chat::SentenceSegmenter;

fn speech_like(rate: u32, millis: u32) -> Vec<i16> {
    let len = (rate * millis / 1000) as usize;
    (0..len)
        .map(|i| {
            let t = i as f32 / rate as f32;
            ((t * 220.0 * std::f32::consts::TAU).sin() * 6000.0) as i16
        })
        .collect()
}

fn bench_resample(c: &mut Criterion) {
    let mut group = c.benchmark_group("resample_1s_to_16k");
    for &rate in SUPPORTED_SAMPLE_RATES {
        let audio = speech_like(rate, 1000);
        group.bench_with_input(BenchmarkId::from_parameter(rate), &audio, |b, audio| {
            b.iter(|| resample(black_box(audio), rate, 16000));
        });
    }
    group.finish();
}

fn bench_vad(c: &mut Criterion) {
    let audio = speech_like(48000, 1000);
    c.bench_function("vad_1s_48k_1024_frames", |b| {
        b.iter(|| {
            let mut vad = Vad::new(VadConfig::default(), 48000);
            for frame in audio.chunks(1024) {
                black_box(vad.process(frame));
            }
        });
    });
    c.bench_function("rms_1024", |b| {
        let frame = &audio[..1024];
        b.iter(|| calculate_rms(black_box(frame)));
    });
}

fn bench_segmenter(c: &mut Criterion) {
    let deltas: Vec<String> = "In the beginning was the Word, and the Word was with God. \
        The same was in the beginning with God. All things were made by him."
        .split_inclusive(' ')
        .map(str::to_string)
        .collect();
    c.bench_function("segment_streamed_answer", |b| {
        b.iter(|| {
            let mut segmenter = SentenceSegmenter::new();
            let mut lines = 0;
            for delta in &deltas {
                lines += usize::from(segmenter.push(black_box(delta)).is_some());
            }
            lines + usize::from(segmenter.finish().is_some())
        });
    });
}

criterion_group!(benches, bench_resample, bench_vad, bench_segmenter);
criterion_main!(benches);
