//! Timing harness for the sample construction pipeline
//!
//! Each benchmark runs one pipeline stage on synthetic inputs: canvas
//! resampling, tensor conversion and tokenization.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use refseg_core::error::{Error, Result};
use refseg_transforms::tokenize::{END_OF_TEXT, START_OF_TEXT};
use refseg_transforms::{
    compute_transform, warp_rgb, Border, ClipTokenizer, Interpolation, Normalize, TextEncoder,
};

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of timed iterations
    pub iterations: usize,

    /// Untimed warmup iterations
    pub warmup_iterations: usize,

    /// Samples processed per iteration
    pub batch_size: usize,

    /// Original image height
    pub image_height: usize,

    /// Original image width
    pub image_width: usize,

    /// Canvas side
    pub input_size: usize,

    /// Token row length
    pub word_length: usize,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 2,
            batch_size: 8,
            image_height: 480,
            image_width: 640,
            input_size: 416,
            word_length: 17,
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Throughput (samples/second)
    pub throughput: f64,
}

/// Run a benchmark
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut func: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<()>,
{
    if config.iterations == 0 {
        return Err(Error::InvalidArgument(
            "a benchmark needs at least one iteration".into(),
        ));
    }

    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let start_total = Instant::now();
    for _ in 0..config.iterations {
        let start = Instant::now();
        func()?;
        times.push(start.elapsed());
    }
    let total_time = start_total.elapsed();

    let avg_time = times.iter().sum::<Duration>() / u32::try_from(times.len()).unwrap_or(u32::MAX);
    let min_time = times.iter().copied().min().unwrap_or_default();
    let max_time = times.iter().copied().max().unwrap_or_default();

    let total_samples = config.iterations * config.batch_size;
    #[allow(clippy::cast_precision_loss)]
    let throughput = total_samples as f64 / total_time.as_secs_f64().max(f64::EPSILON);
    debug!(name, ?avg_time, throughput, "benchmark finished");

    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        throughput,
    })
}

fn synthetic_image(config: &BenchConfig, seed: u64) -> Array3<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array3::from_shape_simple_fn((config.image_height, config.image_width, 3), || rng.gen())
}

/// Benchmark placing images on the canvas with bicubic resampling
pub fn bench_warp(config: &BenchConfig) -> Result<BenchResult> {
    let image = synthetic_image(config, 0);
    let border = Normalize::default().border_color();
    let size = config.input_size;

    run_benchmark("Canvas Warp", config, || {
        for _ in 0..config.batch_size {
            let (forward, _) =
                compute_transform(config.image_height, config.image_width, size, true)?;
            warp_rgb(
                image.view(),
                &forward,
                (size, size),
                Interpolation::Cubic,
                Border::Constant(border),
            )?;
        }
        Ok(())
    })
}

/// Benchmark conversion of canvases into normalized tensors
pub fn bench_convert(config: &BenchConfig) -> Result<BenchResult> {
    let canvas_config = BenchConfig {
        image_height: config.input_size,
        image_width: config.input_size,
        ..config.clone()
    };
    let canvas = synthetic_image(&canvas_config, 1);
    let normalize = Normalize::default();

    run_benchmark("Tensor Conversion", config, || {
        for _ in 0..config.batch_size {
            normalize.image_to_tensor(canvas.view())?;
        }
        Ok(())
    })
}

/// Encoder that hashes each word into the vocabulary range
#[derive(Debug, Default)]
pub struct HashEncoder;

const VOCAB_SIZE: u32 = 49406;

impl TextEncoder for HashEncoder {
    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        text.split_whitespace()
            .map(|word| {
                let mut hasher = DefaultHasher::new();
                word.hash(&mut hasher);
                u32::try_from(hasher.finish() % u64::from(VOCAB_SIZE))
                    .map_err(|e| Error::Tokenizer(e.to_string()))
            })
            .collect()
    }

    fn token_id(&self, token: &str) -> Option<u32> {
        match token {
            START_OF_TEXT => Some(VOCAB_SIZE),
            END_OF_TEXT => Some(VOCAB_SIZE + 1),
            _ => None,
        }
    }
}

const SENTENCES: &[&str] = &[
    "man on the left",
    "the large brown dog sitting next to a bicycle near the entrance",
    "bipolar forceps",
    "white car",
];

/// Benchmark fixed-length tokenization of a batch of sentences
pub fn bench_tokenize(config: &BenchConfig) -> Result<BenchResult> {
    let tokenizer = ClipTokenizer::new(Arc::new(HashEncoder))?;
    let texts: Vec<&str> = SENTENCES.iter().copied().cycle().take(config.batch_size).collect();

    run_benchmark("Tokenization", config, || {
        tokenizer.tokenize(&texts, config.word_length, true)?;
        Ok(())
    })
}
