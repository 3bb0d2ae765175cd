//! Criterion benchmarks for the render path
//!
//! Run with: cargo bench -p duplex-core
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use duplex_core::buffer::{ChannelBuffers, HardwareBuffer, HardwareBufferMut, gather, scatter};
use duplex_core::{ConsumerBinding, NegotiatedParams, RenderEngine};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZES: &[u32] = &[64, 128, 256, 512, 1024];

fn params(input: u16, output: u16, frames: u32) -> NegotiatedParams {
    NegotiatedParams {
        sample_rate: SAMPLE_RATE,
        input_channels: input,
        output_channels: output,
        buffer_frame_count: frames,
    }
}

fn bench_output_only(c: &mut Criterion) {
    let mut group = c.benchmark_group("RenderOutputOnly");

    for &frames in BLOCK_SIZES {
        group.bench_with_input(BenchmarkId::new("stereo", frames), &frames, |b, &frames| {
            let mut engine = RenderEngine::new(ConsumerBinding::function(|buf, _| buf.fill(0.1)));
            engine.configure(params(0, 2, frames));
            let mut hw = vec![0.0f32; 2 * frames as usize];
            b.iter(|| {
                engine.render(None, &mut [HardwareBufferMut::new(2, &mut hw)]);
                black_box(&hw);
            });
        });
    }

    group.finish();
}

fn bench_duplex(c: &mut Criterion) {
    let mut group = c.benchmark_group("RenderDuplex");

    for &frames in BLOCK_SIZES {
        let n = frames as usize;
        group.bench_with_input(BenchmarkId::new("interleaved", frames), &frames, |b, &frames| {
            let mut engine = RenderEngine::new(ConsumerBinding::function(|_, _| {}));
            engine.configure(params(2, 2, frames));
            let input = vec![0.25f32; 2 * n];
            let mut out = vec![0.0f32; 2 * n];
            b.iter(|| {
                engine.render(
                    Some(&[HardwareBuffer::new(2, black_box(&input))]),
                    &mut [HardwareBufferMut::new(2, &mut out)],
                );
            });
        });

        group.bench_with_input(BenchmarkId::new("planar", frames), &frames, |b, &frames| {
            let mut engine = RenderEngine::new(ConsumerBinding::function(|_, _| {}));
            engine.configure(params(2, 2, frames));
            let left = vec![0.25f32; n];
            let right = vec![-0.25f32; n];
            let mut out_l = vec![0.0f32; n];
            let mut out_r = vec![0.0f32; n];
            b.iter(|| {
                let input = [HardwareBuffer::new(1, &left), HardwareBuffer::new(1, &right)];
                let mut output = [
                    HardwareBufferMut::new(1, &mut out_l),
                    HardwareBufferMut::new(1, &mut out_r),
                ];
                engine.render(Some(&input), &mut output);
            });
        });
    }

    group.finish();
}

fn bench_adapter(c: &mut Criterion) {
    let mut group = c.benchmark_group("BufferAdapter");
    let frames = 256;
    let hw_in = vec![0.5f32; 2 * frames];
    let mut hw_out = vec![0.0f32; 2 * frames];
    let mut storage = vec![0.0f32; 2 * frames];

    group.bench_function("gather_interleaved", |b| {
        b.iter(|| {
            let mut view = ChannelBuffers::new(&mut storage, 2, frames);
            gather(&[HardwareBuffer::new(2, black_box(&hw_in))], 0, &mut view);
        });
    });

    group.bench_function("scatter_interleaved", |b| {
        b.iter(|| {
            let view = ChannelBuffers::new(&mut storage, 2, frames);
            scatter(&view, &mut [HardwareBufferMut::new(2, &mut hw_out)], 0);
            black_box(&hw_out);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_output_only, bench_duplex, bench_adapter);

criterion_main!(benches);
