use burn::{
    config::Config,
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings},
    tensor::backend::AutodiffBackend,
};
use std::{fs::{self, File}, io::BufWriter, path::{Path, PathBuf}};
use tracing::info;

use crate::dataset::{build_windows, CharVocab, WindowBatcher, WindowBatches};
use crate::errors::{self, LyricError};
use crate::model::{CellKind, RecurrentLmConfig};
use crate::plot::{plot_losses, LossSplit};
use crate::train::{train_model, LossHistory, TrainingConfig};
use crate::transcript::SampleTranscript;

/// Hyperparameter grid; every combination is trained once
#[derive(Config, Debug)]
pub struct SweepConfig {
    pub training: TrainingConfig,

    /// Window lengths
    #[config(default = "vec![40, 80]")]
    pub max_lens: Vec<usize>,

    #[config(default = "vec![CellKind::Lstm]")]
    pub cells: Vec<CellKind>,

    /// Stacked bidirectional layers
    #[config(default = "vec![1]")]
    pub depths: Vec<usize>,

    /// Units per direction
    #[config(default = "vec![8, 16, 64, 128]")]
    pub hidden_sizes: Vec<usize>,

    #[config(default = 0.2)]
    pub dropout: f64,
}

impl SweepConfig {
    /// Model configs in run order: window length, then cell, then depth, then hidden size
    pub fn runs(&self, vocab_size: usize) -> Vec<RecurrentLmConfig> {
        let mut runs = Vec::new();
        for &maxlen in &self.max_lens {
            for &cell in &self.cells {
                for &depth in &self.depths {
                    for &hidden_size in &self.hidden_sizes {
                        runs.push(
                            RecurrentLmConfig::new(cell, maxlen, vocab_size, hidden_size)
                                .with_depth(depth)
                                .with_dropout(self.dropout),
                        );
                    }
                }
            }
        }
        runs
    }
}

/// Where a sweep writes its results
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Create `output_files/`, `models/` and `figs/` under `root`
    pub fn create<P: AsRef<Path>>(root: P) -> errors::Result<Self> {
        let layout = Self { root: root.as_ref().to_path_buf() };
        fs::create_dir_all(layout.root.join("output_files"))?;
        fs::create_dir_all(layout.root.join("models"))?;
        fs::create_dir_all(layout.root.join("figs"))?;
        Ok(layout)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn transcript(&self, name: &str) -> PathBuf {
        self.root.join("output_files").join(format!("{name}.txt"))
    }

    pub fn model(&self, name: &str) -> PathBuf {
        self.root.join("models").join(format!("{name}.bin"))
    }

    pub fn model_config(&self, name: &str) -> PathBuf {
        self.root.join("models").join(format!("{name}.json"))
    }

    pub fn history(&self, name: &str) -> PathBuf {
        self.root.join("models").join(format!("{name}_losses.json"))
    }

    pub fn vocab(&self) -> PathBuf {
        self.root.join("vocab.txt")
    }

    pub fn figure(&self, file: &str) -> PathBuf {
        self.root.join("figs").join(file)
    }
}

/// Train every model of the grid on `corpus` and write all artifacts under `output`.
///
/// Returns the loss history of each run in run order. The first failing run
/// aborts the sweep; artifacts of runs that already finished stay on disk.
pub fn run_sweep<B: AutodiffBackend>(
    config: &SweepConfig,
    corpus: &str,
    output: &Path,
    device: &B::Device,
) -> errors::Result<Vec<LossHistory>> {
    if corpus.is_empty() {
        return Err(LyricError::EmptyCorpus);
    }

    let layout = OutputLayout::create(output)?;
    let mut vocab = CharVocab::new();
    vocab.build_from_text(corpus);
    vocab.save_to_file(layout.vocab())?;
    config.save(layout.root().join("sweep.json"))?;

    let runs = config.runs(vocab.size());
    if runs.is_empty() {
        return Err(LyricError::InvalidParameter("hyperparameter grid is empty".into()));
    }
    info!(
        corpus_chars = corpus.chars().count(),
        vocab_size = vocab.size(),
        runs = runs.len(),
        "starting sweep"
    );

    let training = &config.training;
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let mut histories = Vec::with_capacity(runs.len());

    for run in runs {
        let name = run.name();
        info!("Running for model: {}", name);

        let windows = build_windows(corpus, &vocab, run.maxlen())?;
        let (train, valid) = windows.split(training.train_fraction);
        info!(train = train.len(), valid = valid.len(), "built windows");

        let mut train_batches = WindowBatches::new(
            train,
            WindowBatcher::<B>::new(vocab.size(), device.clone()),
            training.batch_size,
            "training",
        )?;
        let mut valid_batches = WindowBatches::new(
            valid,
            WindowBatcher::<B::InnerBackend>::new(vocab.size(), device.clone()),
            training.batch_size,
            "validation",
        )?;

        B::seed(device, training.seed);
        let model = run.init::<B>(device);

        let writer = BufWriter::new(File::create(layout.transcript(&name))?);
        let mut transcript = SampleTranscript::new(writer, windows, vocab.clone(), training.seed)?
            .with_sample_length(training.sample_length)
            .with_temperatures(training.temperatures.clone());

        let (model, history) = train_model(
            training,
            &name,
            model,
            &mut train_batches,
            &mut valid_batches,
            &mut transcript,
        )?;
        transcript.into_inner()?;

        let model_path = layout.model(&name);
        model.save_file(model_path.clone(), &recorder)
            .map_err(|e| LyricError::ModelSave { path: model_path.clone(), reason: format!("{e:?}") })?;
        run.save(layout.model_config(&name))?;
        history.save(layout.history(&name))?;
        info!(model = %model_path.display(), "saved model");

        histories.push(history);
    }

    let writer = BufWriter::new(File::create(layout.root().join("losses.json"))?);
    serde_json::to_writer_pretty(writer, &histories)?;

    plot_losses(&histories, LossSplit::Train, layout.figure("train_errors.png"))?;
    plot_losses(&histories, LossSplit::Validation, layout.figure("val_errors.png"))?;
    info!(dir = %layout.root().display(), "sweep complete");

    Ok(histories)
}
