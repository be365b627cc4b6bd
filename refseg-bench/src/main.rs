//! Benchmark runner for the sample construction pipeline

use anyhow::Context;
use refseg_bench::{bench_convert, bench_tokenize, bench_warp, BenchConfig, BenchResult};

fn report(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} samples/sec", result.throughput);
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("=== Referring Segmentation Pipeline Benchmarks ===");

    let config = BenchConfig::default();
    report(&bench_warp(&config).context("canvas warp benchmark failed")?);
    report(&bench_convert(&config).context("tensor conversion benchmark failed")?);
    report(&bench_tokenize(&config).context("tokenization benchmark failed")?);

    println!("\n=== Canvas Size Sweep ===");
    for input_size in [224, 320, 416, 480] {
        let config = BenchConfig {
            iterations: 3,
            warmup_iterations: 1,
            input_size,
            ..BenchConfig::default()
        };
        let result = bench_warp(&config)
            .with_context(|| format!("canvas warp benchmark failed at size {input_size}"))?;
        println!("\nCanvas: {input_size}x{input_size}");
        println!("  Average time: {:?}", result.avg_time);
        println!("  Throughput:   {:.2} samples/sec", result.throughput);
    }

    Ok(())
}
