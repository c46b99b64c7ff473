use burn::{
    config::Config,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, cast::ToElement},
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufWriter, path::Path};
use tracing::info;

use crate::dataset::WindowBatches;
use crate::errors;
use crate::model::RecurrentLm;
use crate::transcript::EpochHook;

/// Configuration for training one model
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Optimizer configuration
    pub optimizer: AdamConfig,

    #[config(default = 1e-2)]
    pub learning_rate: f64,

    #[config(default = 128)]
    pub batch_size: usize,

    #[config(default = 20)]
    pub num_epochs: usize,

    /// Fraction of windows (by position) used for training; the rest validate
    #[config(default = 0.8)]
    pub train_fraction: f64,

    /// Stop after this many epochs without a better validation loss (0 to disable)
    #[config(default = 0)]
    pub patience: usize,

    /// Characters generated per temperature after each epoch
    #[config(default = 100)]
    pub sample_length: usize,

    /// Sampling temperatures for the epoch transcript
    #[config(default = "vec![0.3, 0.4, 0.5, 0.6, 0.7]")]
    pub temperatures: Vec<f64>,

    /// Random seed for weights, seed-window choice and sampling
    #[config(default = 10)]
    pub seed: u64,
}

/// Mean losses of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLosses {
    pub epoch: usize,
    pub train_loss: f32,
    pub valid_loss: f32,
}

/// Per-epoch loss curves of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LossHistory {
    pub name: String,
    pub train_loss: Vec<f32>,
    pub valid_loss: Vec<f32>,
}

impl LossHistory {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn push(&mut self, losses: &EpochLosses) {
        self.train_loss.push(losses.train_loss);
        self.valid_loss.push(losses.valid_loss);
    }

    pub fn epochs(&self) -> usize {
        self.train_loss.len()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> errors::Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}

fn progress_bar(len: usize, template: &str) -> ProgressBar {
    let progress_bar = ProgressBar::new(len as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    progress_bar
}

/// Owns the model while it is being optimized
pub struct Trainer<B: AutodiffBackend> {
    model: RecurrentLm<B>,
    learning_rate: f64,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(model: RecurrentLm<B>, config: &TrainingConfig) -> Self {
        Self { model, learning_rate: config.learning_rate }
    }

    pub fn model(&self) -> &RecurrentLm<B> {
        &self.model
    }

    pub fn into_model(self) -> RecurrentLm<B> {
        self.model
    }

    /// Run one epoch of optimizer steps and return the mean batch loss
    pub fn train_epoch<O: Optimizer<RecurrentLm<B>, B>>(
        &mut self,
        batches: &mut WindowBatches<B>,
        optimizer: &mut O,
    ) -> f32 {
        let total_steps = batches.steps_per_epoch();
        let progress_bar = progress_bar(
            total_steps,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) - {msg}",
        );

        let mut total_loss = 0.0;
        let mut batch_count = 0;

        for (step, batch) in batches.by_ref().take(total_steps).enumerate() {
            let loss = self.model.loss(batch.input, batch.target);
            let loss_value = loss.clone().into_scalar().to_f32();

            let grads = GradientsParams::from_grads(loss.backward(), &self.model);
            self.model = optimizer.step(self.learning_rate, self.model.clone(), grads);

            total_loss += loss_value;
            batch_count += 1;

            progress_bar.inc(1);
            progress_bar.set_message(format!("Batch {}/{}, Loss: {:.6}", step + 1, total_steps, loss_value));
        }

        let epoch_loss = total_loss / batch_count.max(1) as f32;
        progress_bar.finish_with_message(format!("Train loss: {:.6}", epoch_loss));
        epoch_loss
    }

    /// Mean loss over one epoch of validation batches, without gradients
    pub fn validate(&self, batches: &mut WindowBatches<B::InnerBackend>) -> f32 {
        let total_steps = batches.steps_per_epoch();
        let progress_bar = progress_bar(
            total_steps,
            "{spinner:.green} [{elapsed_precise}] [{bar:40.yellow/blue}] {pos}/{len} ({eta}) - {msg}",
        );

        let model = self.model.valid();
        let mut total_loss = 0.0;
        let mut batch_count = 0;

        for batch in batches.by_ref().take(total_steps) {
            let loss_value = model.loss(batch.input, batch.target).into_scalar().to_f32();
            total_loss += loss_value;
            batch_count += 1;
            progress_bar.inc(1);
        }

        let avg_loss = total_loss / batch_count.max(1) as f32;
        progress_bar.finish_with_message(format!("Valid loss: {:.6}", avg_loss));
        avg_loss
    }
}

/// Train `model` for the configured number of epochs.
///
/// Both batch streams keep their position between epochs. After every epoch
/// `hook` receives the inference copy of the model. Epochs are numbered from 0.
pub fn train_model<B: AutodiffBackend, H: EpochHook<B::InnerBackend>>(
    config: &TrainingConfig,
    name: &str,
    model: RecurrentLm<B>,
    train_batches: &mut WindowBatches<B>,
    valid_batches: &mut WindowBatches<B::InnerBackend>,
    hook: &mut H,
) -> errors::Result<(RecurrentLm<B>, LossHistory)> {
    let mut optimizer = config.optimizer.init();
    let mut trainer = Trainer::new(model, config);
    let mut history = LossHistory::new(name);

    let mut best_loss = f32::MAX;
    let mut epochs_without_improvement = 0;

    for epoch in 0..config.num_epochs {
        let train_loss = trainer.train_epoch(train_batches, &mut optimizer);
        let valid_loss = trainer.validate(valid_batches);
        let losses = EpochLosses { epoch, train_loss, valid_loss };

        info!(
            run = name,
            "Epoch {}/{} - Train Loss: {:.6}, Valid Loss: {:.6}",
            epoch + 1,
            config.num_epochs,
            train_loss,
            valid_loss
        );

        history.push(&losses);
        hook.on_epoch_end(epoch, &trainer.model().valid(), &losses)?;

        if valid_loss < best_loss {
            best_loss = valid_loss;
            epochs_without_improvement = 0;
        } else {
            epochs_without_improvement += 1;
        }
        if config.patience > 0 && epochs_without_improvement >= config.patience {
            info!(run = name, epoch = epoch + 1, "validation loss stalled, stopping early");
            break;
        }
    }

    Ok((trainer.into_model(), history))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_defaults() {
        let config = TrainingConfig::new(AdamConfig::new());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.num_epochs, 20);
        assert_eq!(config.sample_length, 100);
        assert_eq!(config.patience, 0);
        assert_eq!(config.temperatures, vec![0.3, 0.4, 0.5, 0.6, 0.7]);
        assert!((config.learning_rate - 0.01).abs() < 1e-12);
        assert!((config.train_fraction - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_loss_history_push() {
        let mut history = LossHistory::new("LSTM_40_1_8");
        history.push(&EpochLosses { epoch: 0, train_loss: 2.0, valid_loss: 2.5 });
        history.push(&EpochLosses { epoch: 1, train_loss: 1.5, valid_loss: 2.1 });
        assert_eq!(history.epochs(), 2);
        assert_eq!(history.train_loss, vec![2.0, 1.5]);
        assert_eq!(history.valid_loss, vec![2.5, 2.1]);

        let json = serde_json::to_string(&history).unwrap();
        let back: LossHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }

    #[cfg(all(feature = "ndarray", feature = "autodiff"))]
    mod backend {
        use super::*;
        use crate::dataset::{CharVocab, WindowBatcher, WindowSet};
        use crate::model::{CellKind, RecurrentLmConfig};
        use crate::transcript::NoHook;
        use burn::backend::{Autodiff, ndarray::{NdArray, NdArrayDevice}};

        type Inner = NdArray<f32>;
        type TestBackend = Autodiff<Inner>;

        fn batches(corpus: &str, maxlen: usize, batch_size: usize)
            -> (WindowBatches<TestBackend>, WindowBatches<Inner>, usize)
        {
            let device = NdArrayDevice::default();
            let mut vocab = CharVocab::new();
            vocab.build_from_text(corpus);
            let windows = WindowSet::new(corpus, &vocab, maxlen).unwrap();
            let (train, valid) = windows.split(0.8);
            let train = WindowBatches::new(train, WindowBatcher::new(vocab.size(), device.clone()), batch_size, "training").unwrap();
            let valid = WindowBatches::new(valid, WindowBatcher::new(vocab.size(), device), batch_size, "validation").unwrap();
            (train, valid, vocab.size())
        }

        #[test]
        fn test_loss_decreases_on_repetitive_text() {
            let corpus = "abc".repeat(30);
            let (mut train, mut valid, vocab_size) = batches(&corpus, 3, 16);
            let model = RecurrentLmConfig::new(CellKind::Lstm, 3, vocab_size, 8)
                .with_depth(1)
                .with_dropout(0.0)
                .init::<TestBackend>(&NdArrayDevice::default());
            let config = TrainingConfig::new(AdamConfig::new()).with_num_epochs(8);

            let (_, history) = train_model(&config, "LSTM_3_1_8", model, &mut train, &mut valid, &mut NoHook).unwrap();
            assert_eq!(history.epochs(), 8);
            assert!(history.train_loss.iter().all(|l| l.is_finite()));
            assert!(history.train_loss[7] < history.train_loss[0]);
        }

        #[test]
        fn test_patience_stops_early() {
            let corpus = "abcd".repeat(10);
            let (mut train, mut valid, vocab_size) = batches(&corpus, 3, 8);
            let model = RecurrentLmConfig::new(CellKind::Gru, 3, vocab_size, 2)
                .with_depth(1)
                .init::<TestBackend>(&NdArrayDevice::default());
            // A zero learning rate never improves on the first epoch's loss
            let config = TrainingConfig::new(AdamConfig::new())
                .with_num_epochs(10)
                .with_learning_rate(0.0)
                .with_patience(2);

            let (_, history) = train_model(&config, "GRU_3_1_2", model, &mut train, &mut valid, &mut NoHook).unwrap();
            assert!(history.epochs() < 10);
        }
    }
}
