use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use partition_batch::chunk::{ChunkPipeline, ListItemReader, PassThroughProcessor};
use partition_batch::models::{ExecutionContext, StepExecution};
use partition_batch::partition::{partition, partition_key_space, KeySpace};
use partition_batch::sample::TableWriter;

fn benchmark_partitioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    for grid_size in [3_i64, 64, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(grid_size), &grid_size, |b, grid| {
            b.iter(|| partition(black_box(10_000_000), black_box(*grid)))
        });
    }
    group.finish();

    c.bench_function("partition_key_space_wide", |b| {
        b.iter(|| partition_key_space(black_box(KeySpace::new(i64::MIN, i64::MAX)), black_box(16)))
    });
}

fn benchmark_chunk_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("benchmark runtime");
    let pipeline = ChunkPipeline::new(100).expect("chunk size");

    c.bench_function("chunk_pipeline_10k_items", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let mut reader = ListItemReader::new(0..10_000_i64);
                let writer: TableWriter<i64> = TableWriter::new();
                let step = StepExecution::new(1, "bench.worker", ExecutionContext::new());
                black_box(
                    pipeline
                        .run(step, &mut reader, &PassThroughProcessor, &writer)
                        .await,
                )
            })
        })
    });
}

criterion_group!(benches, benchmark_partitioning, benchmark_chunk_pipeline);
criterion_main!(benches);
