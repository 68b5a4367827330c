//! Демонстрация: прогоняет синтетический батч через диспетчер аугментаций.

use clap::{Parser, ValueEnum};
use ndarray::{ArrayD, Axis, IxDyn};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vecaug::{AugmentationConfig, ExecutionPath, FactorSampler, FlipMode, Inputs, LayerSpec};

/// Путь обработки батча
#[derive(Debug, Clone, Copy, ValueEnum)]
enum PathArg {
    Auto,
    Vectorized,
    Loop,
}

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(author, version, about = "vecaug: batch augmentation dispatcher demo", long_about = None)]
struct Args {
    /// JSON-файл с AugmentationConfig (по умолчанию сдвиг канала и отражение)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long, default_value_t = 4)]
    batch_size: usize,

    #[arg(long, default_value_t = 8)]
    height: usize,

    #[arg(long, default_value_t = 8)]
    width: usize,

    #[arg(long, default_value_t = 3)]
    channels: usize,

    /// Переопределяет seed из конфигурации
    #[arg(short, long)]
    seed: Option<u64>,

    #[arg(short, long, value_enum, default_value_t = PathArg::Auto)]
    path: PathArg,
}

fn default_config() -> Result<AugmentationConfig, Box<dyn std::error::Error>> {
    Ok(AugmentationConfig {
        seed: Some(42),
        layers: vec![
            LayerSpec::ChannelShift {
                channel: None,
                factor: FactorSampler::uniform(0.0, 64.0)?,
            },
            LayerSpec::RandomFlip {
                mode: FlipMode::Horizontal,
                probability: 0.5,
            },
        ],
        ..AugmentationConfig::default()
    })
}

/// Градиентный батч в объявленном диапазоне значений.
fn synthetic_batch(args: &Args, config: &AugmentationConfig) -> Inputs {
    let shape = [args.batch_size, args.height, args.width, args.channels];
    let range = config.value_range;
    let total = (args.height * args.width).max(1) as f32;
    let images = ArrayD::from_shape_fn(IxDyn(&shape), |idx| {
        let t = (idx[1] * args.width + idx[2]) as f32 / total;
        range.low() + t * range.width()
    });
    Inputs::new(images)
}

fn channel_means(images: &ArrayD<f32>) -> Vec<f32> {
    let channel_axis = Axis(images.ndim() - 1);
    images
        .axis_iter(channel_axis)
        .map(|channel| channel.mean().unwrap_or(0.0))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "loading augmentation config");
            AugmentationConfig::load(path)?
        }
        None => default_config()?,
    };
    if args.seed.is_some() {
        config.seed = args.seed;
    }

    let dispatcher = config.build()?;
    let batch = synthetic_batch(&args, &config);
    info!(
        layer = dispatcher.layer().name(),
        shape = ?batch.images.shape(),
        "running augmentation"
    );

    let output = match args.path {
        PathArg::Auto => dispatcher.process(&batch)?,
        PathArg::Vectorized => dispatcher.process_with_path(&batch, ExecutionPath::Vectorized)?,
        PathArg::Loop => dispatcher.process_with_path(&batch, ExecutionPath::Loop)?,
    };

    info!(means = ?channel_means(&batch.images), "channel means before");
    info!(means = ?channel_means(&output.images), "channel means after");
    info!(shape = ?output.images.shape(), "done");
    Ok(())
}
