use std::io::Write;
use burn::tensor::backend::Backend;
use rand::{rngs::StdRng, Rng, SeedableRng};
use tracing::debug;

use crate::dataset::{CharVocab, WindowSet};
use crate::errors::{LyricError, Result};
use crate::model::RecurrentLm;
use crate::sampler::generate_text;
use crate::train::EpochLosses;

/// Temperatures sampled after every epoch
pub const SAMPLE_TEMPERATURES: [f64; 5] = [0.3, 0.4, 0.5, 0.6, 0.7];

/// Called by the training loop once per finished epoch, with the inference model.
pub trait EpochHook<B: Backend> {
    fn on_epoch_end(&mut self, epoch: usize, model: &RecurrentLm<B>, losses: &EpochLosses) -> Result<()>;
}

/// Hook that does nothing, for training without samples
pub struct NoHook;

impl<B: Backend> EpochHook<B> for NoHook {
    fn on_epoch_end(&mut self, _epoch: usize, _model: &RecurrentLm<B>, _losses: &EpochLosses) -> Result<()> {
        Ok(())
    }
}

/// Writes generated lyrics at several temperatures after each epoch.
///
/// Every epoch draws one seed window at random from all windows (training and
/// validation alike) and continues it at each temperature in turn.
pub struct SampleTranscript<W: Write> {
    writer: W,
    windows: WindowSet,
    vocab: CharVocab,
    temperatures: Vec<f64>,
    sample_length: usize,
    rng: StdRng,
}

impl<W: Write> SampleTranscript<W> {
    pub fn new(writer: W, windows: WindowSet, vocab: CharVocab, seed: u64) -> Result<Self> {
        if windows.is_empty() {
            return Err(LyricError::EmptyDataset {
                split: "seed".to_string(),
                maxlen: windows.maxlen(),
            });
        }
        Ok(Self {
            writer,
            windows,
            vocab,
            temperatures: SAMPLE_TEMPERATURES.to_vec(),
            sample_length: 100,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn with_sample_length(mut self, sample_length: usize) -> Self {
        self.sample_length = sample_length;
        self
    }

    pub fn with_temperatures(mut self, temperatures: Vec<f64>) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<B: Backend, W: Write> EpochHook<B> for SampleTranscript<W> {
    fn on_epoch_end(&mut self, epoch: usize, model: &RecurrentLm<B>, _losses: &EpochLosses) -> Result<()> {
        writeln!(self.writer, "\n----- Generating text after Epoch: {epoch}")?;

        let seed_index = self.rng.gen_range(0..self.windows.len());
        let seed = self.windows.window_text(seed_index);
        debug!(epoch, seed_index, "sampling transcript");

        for &temperature in &self.temperatures {
            writeln!(self.writer, "----- Diversity:{temperature}")?;
            writeln!(self.writer, "----- Generating with seed:\n\"{seed}\"")?;
            writeln!(self.writer, "----- Generated lyrics:")?;
            write!(self.writer, "{seed}")?;

            let generated = generate_text(
                model,
                &self.vocab,
                &seed,
                self.sample_length,
                temperature,
                &mut self.rng,
            )?;
            write!(self.writer, "{generated}\n\n")?;
        }
        writeln!(self.writer, "{}", "=".repeat(80))?;
        self.writer.flush()?;
        Ok(())
    }
}
