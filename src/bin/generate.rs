use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use std::{path::PathBuf, process::ExitCode};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use lyricgen::{
    backend_device, backend_name, clean_text, generate_text, BinFileRecorder, CharVocab, Config,
    FullPrecisionSettings, LyricError, Module, RawBackend, Recorder, RecurrentLm,
    RecurrentLmConfig, Result,
};

/// Continue a seed line with a trained lyric model
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Model weights written by `train` (models/<name>.bin)
    #[arg(long)]
    model: PathBuf,

    /// Model configuration; defaults to the weights path with a .json extension
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "lyricgen_artifacts/vocab.txt")]
    vocab: PathBuf,

    #[arg(long, default_value = "i got a feeling")]
    seed_text: String,

    /// Characters to generate
    #[arg(long, default_value_t = 400)]
    length: usize,

    #[arg(long, default_value_t = 0.5)]
    temperature: f64,

    /// Sampling seed
    #[arg(long, default_value_t = 10)]
    rng_seed: u64,
}

/// Clean `text` and make it exactly `maxlen` characters long.
///
/// Characters missing from the vocabulary are dropped, long seeds keep their
/// tail and short seeds are padded on the left with spaces.
fn fit_seed(text: &str, vocab: &CharVocab, maxlen: usize) -> Result<String> {
    let cleaned: Vec<char> = clean_text(text)
        .chars()
        .filter(|&c| vocab.char_to_index(c).is_some())
        .collect();

    let pad = if vocab.char_to_index(' ').is_some() {
        ' '
    } else {
        vocab.index_to_char(0).ok_or(LyricError::EmptyCorpus)?
    };

    let tail = &cleaned[cleaned.len().saturating_sub(maxlen)..];
    let mut seed: String = std::iter::repeat(pad).take(maxlen - tail.len()).collect();
    seed.extend(tail);
    Ok(seed)
}

fn run(args: Args) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(|| args.model.with_extension("json"));
    let config = RecurrentLmConfig::load(&config_path).map_err(|e| LyricError::ConfigLoad {
        path: config_path.clone(),
        reason: e.to_string(),
    })?;

    let mut vocab = CharVocab::new();
    vocab.load_from_file(&args.vocab)?;
    if vocab.size() != config.vocab_size() {
        return Err(LyricError::InvalidParameter(format!(
            "vocabulary has {} characters but the model expects {}",
            vocab.size(),
            config.vocab_size()
        )));
    }

    let device = backend_device();
    info!(backend = backend_name(), model = %config.name(), "loading model");

    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    let record = recorder
        .load::<<RecurrentLm<RawBackend> as Module<RawBackend>>::Record>(args.model.clone(), &device)
        .map_err(|e| LyricError::ModelLoad {
            path: args.model.clone(),
            reason: format!("{e:?}"),
        })?;
    let model = config.init::<RawBackend>(&device).load_record(record);

    let seed = fit_seed(&args.seed_text, &vocab, config.maxlen())?;
    if seed.trim().is_empty() {
        warn!("seed text has no usable characters, starting from blank input");
    }

    let mut rng = StdRng::seed_from_u64(args.rng_seed);
    let generated = generate_text(&model, &vocab, &seed, args.length, args.temperature, &mut rng)?;
    println!("{}{}", seed.trim_start(), generated);
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> CharVocab {
        let mut vocab = CharVocab::new();
        vocab.build_from_text("abc de");
        vocab
    }

    #[test]
    fn test_short_seed_is_left_padded() {
        assert_eq!(fit_seed("Ab", &vocab(), 5).unwrap(), "   ab");
    }

    #[test]
    fn test_long_seed_keeps_tail() {
        assert_eq!(fit_seed("abc dea", &vocab(), 4).unwrap(), " dea");
    }

    #[test]
    fn test_unknown_chars_are_dropped() {
        assert_eq!(fit_seed("xyz ab!", &vocab(), 5).unwrap(), "   ab");
    }
}
