//! Throughput of the block pipeline over software accelerators
//!
//! Run with:
//!     cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use fpga_block_pipeline::prelude::*;

/// Runs of varying length, so some blocks compress and some are stored raw
fn sample(size: usize) -> Vec<u8> {
    (0..size).map(|i| ((i / 97) * 31 + (i % 5)) as u8).collect()
}

fn bench_compress(c: &mut Criterion) {
    let mut group = c.benchmark_group("compress");
    let data = sample(4 * 1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for lanes in [1usize, 2, 4] {
        let config = PipelineConfig::default()
            .with_block_size(BlockSize::Kb64)
            .with_lanes(lanes, 2);
        let accel = LaneAccelerator::new(RunLengthCodec, lanes).unwrap();
        let mut pipeline = PipelineScheduler::new(config, accel).unwrap();

        group.bench_with_input(BenchmarkId::new("lanes", lanes), &data, |b, data| {
            b.iter(|| black_box(pipeline.compress(black_box(data)).unwrap().data.len()));
        });
    }

    group.finish();
}

fn bench_decompress(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompress");
    let data = sample(4 * 1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    let config = PipelineConfig::default().with_block_size(BlockSize::Kb64);
    let accel = LaneAccelerator::new(RunLengthCodec, config.lanes).unwrap();
    let mut pipeline = PipelineScheduler::new(config, accel).unwrap();
    let stream = pipeline.compress(&data).unwrap().data;

    group.bench_function("run_length", |b| {
        b.iter(|| black_box(pipeline.decompress(black_box(&stream)).unwrap().data.len()));
    });

    group.finish();
}

fn bench_buffer_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffers_per_lane");
    let data = sample(1024 * 1024);
    group.throughput(Throughput::Bytes(data.len() as u64));

    for depth in [1usize, 2, 4] {
        let config = PipelineConfig::default()
            .with_block_size(BlockSize::Kb64)
            .with_lanes(2, depth);
        let accel = LaneAccelerator::new(PassthroughCodec, 2).unwrap();
        let mut pipeline = PipelineScheduler::new(config, accel).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(depth), &data, |b, data| {
            b.iter(|| black_box(pipeline.compress(black_box(data)).unwrap().report.blocks));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compress, bench_decompress, bench_buffer_depth);
criterion_main!(benches);
