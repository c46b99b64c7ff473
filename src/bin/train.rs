use clap::Parser;
use std::{path::PathBuf, process::ExitCode, time::Instant};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use burn::optim::AdamConfig;
use lyricgen::{
    backend_device, backend_name, load_lyrics_csv, load_lyrics_dir, run_sweep, Config,
    LyricError, Result, SweepConfig, TrainBackend, TrainingConfig,
};

/// Train a grid of character-level lyric models
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory of plain-text lyric files
    #[arg(long, conflicts_with = "csv", required_unless_present = "csv")]
    lyrics_dir: Option<PathBuf>,

    /// CSV file with one song per row
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Column of the CSV holding the lyrics
    #[arg(long, default_value = "text")]
    text_column: String,

    /// Directory for transcripts, models and figures
    #[arg(long, default_value = "lyricgen_artifacts")]
    output: PathBuf,

    /// Sweep configuration (JSON); defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,
}

fn load_config(args: &Args) -> Result<SweepConfig> {
    let mut config = match &args.config {
        Some(path) => SweepConfig::load(path).map_err(|e| LyricError::ConfigLoad {
            path: path.clone(),
            reason: e.to_string(),
        })?,
        None => SweepConfig::new(TrainingConfig::new(AdamConfig::new())),
    };

    if let Some(epochs) = args.epochs {
        config.training.num_epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.training.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    Ok(config)
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    let corpus = match (&args.lyrics_dir, &args.csv) {
        (Some(dir), _) => load_lyrics_dir(dir)?,
        (None, Some(csv)) => load_lyrics_csv(csv, &args.text_column)?,
        (None, None) => {
            return Err(LyricError::InvalidParameter("either --lyrics-dir or --csv is required".into()));
        }
    };
    info!(chars = corpus.chars().count(), "loaded corpus");

    let device = backend_device();
    info!(backend = backend_name(), "using backend");

    let start_time = Instant::now();
    let histories = run_sweep::<TrainBackend>(&config, &corpus, &args.output, &device)?;
    info!(
        runs = histories.len(),
        "Training completed in {:.2} seconds",
        start_time.elapsed().as_secs_f64()
    );

    for history in &histories {
        if let (Some(train), Some(valid)) = (history.train_loss.last(), history.valid_loss.last()) {
            info!("{}: final train loss {:.4}, valid loss {:.4}", history.name, train, valid);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
