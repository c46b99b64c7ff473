use burn::tensor::{backend::Backend, Tensor, TensorData};
use rand::{distributions::{Distribution, WeightedIndex}, Rng};

use crate::dataset::{one_hot, CharVocab};
use crate::errors::{LyricError, Result};
use crate::model::RecurrentLm;

/// Reweight a probability vector by `temperature` and renormalize.
///
/// Computes `p_i^(1/T) / sum_j p_j^(1/T)` in log space, relative to the
/// largest entry, so low temperatures cannot underflow every weight to zero.
/// Entries that are zero (or not finite) get weight zero rather than the
/// `log(0)` of a direct evaluation.
pub fn temperature_distribution(probs: &[f32], temperature: f64) -> Result<Vec<f64>> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(LyricError::InvalidParameter(format!(
            "temperature must be positive, got {temperature}"
        )));
    }

    let usable = |p: f64| p.is_finite() && p > 0.0;
    let max = probs.iter()
        .map(|&p| p as f64)
        .filter(|&p| usable(p))
        .fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return Err(LyricError::InvalidParameter(
            "probability vector has no positive entry".into(),
        ));
    }

    let log_max = max.ln();
    let weights: Vec<f64> = probs.iter()
        .map(|&p| {
            let p = p as f64;
            if usable(p) { ((p.ln() - log_max) / temperature).exp() } else { 0.0 }
        })
        .collect();

    let total: f64 = weights.iter().sum();
    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Draw one index from `probs` after temperature scaling.
pub fn sample_index<R: Rng + ?Sized>(probs: &[f32], temperature: f64, rng: &mut R) -> Result<usize> {
    let distribution = temperature_distribution(probs, temperature)?;
    let dist = WeightedIndex::new(&distribution)
        .map_err(|e| LyricError::InvalidParameter(e.to_string()))?;
    Ok(dist.sample(rng))
}

/// Generate `length` characters after `seed`, one window at a time.
///
/// The seed must be exactly as long as the model's window. After each draw
/// the window drops its first character and appends the sampled one.
pub fn generate_text<B: Backend, R: Rng + ?Sized>(
    model: &RecurrentLm<B>,
    vocab: &CharVocab,
    seed: &str,
    length: usize,
    temperature: f64,
    rng: &mut R,
) -> Result<String> {
    let mut window = vocab.encode_text(seed)?;
    let maxlen = model.maxlen();
    if window.len() != maxlen {
        return Err(LyricError::InvalidParameter(format!(
            "seed has {} characters, model window is {maxlen}",
            window.len()
        )));
    }

    let device = model.device();
    let vocab_size = vocab.size();
    let mut sampled = Vec::with_capacity(length);

    for _ in 0..length {
        let values = one_hot(&[window.as_slice()], vocab_size);
        let x = Tensor::<B, 3>::from_data(TensorData::new(values, [1, maxlen, vocab_size]), &device);

        let probs: Vec<f32> = model.probabilities(x)
            .into_data()
            .convert::<f32>()
            .into_vec()
            .map_err(|e| LyricError::Tensor(format!("{e:?}")))?;

        let next = sample_index(&probs, temperature, rng)?;
        if next >= vocab_size {
            return Err(LyricError::InvalidParameter(format!(
                "model produced index {next} outside the vocabulary"
            )));
        }
        sampled.push(next);

        window.rotate_left(1);
        if let Some(last) = window.last_mut() {
            *last = next;
        }
    }

    Ok(vocab.decode_text(&sampled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_certain_prediction_always_wins() {
        let probs = [0.0, 0.0, 1.0, 0.0, 0.0];
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            assert_eq!(sample_index(&probs, 1.0, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_uniform_draws_are_uniform() {
        let probs = [0.25f32; 4];
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 4];
        let draws = 20_000;
        for _ in 0..draws {
            counts[sample_index(&probs, 1.0, &mut rng).unwrap()] += 1;
        }
        for count in counts {
            let freq = count as f64 / draws as f64;
            assert!((freq - 0.25).abs() < 0.02, "frequency {freq} too far from 0.25");
        }
    }

    #[test]
    fn test_temperature_one_is_identity() {
        let probs = [0.5, 0.3, 0.2];
        let dist = temperature_distribution(&probs, 1.0).unwrap();
        for (p, d) in probs.iter().zip(&dist) {
            assert!((*p as f64 - d).abs() < 1e-6);
        }
    }

    #[test]
    fn test_low_temperature_sharpens() {
        let probs = [0.5, 0.3, 0.2];
        let cold = temperature_distribution(&probs, 0.3).unwrap();
        let hot = temperature_distribution(&probs, 2.0).unwrap();
        assert!(cold[0] > 0.5);
        assert!(hot[0] < 0.5);
        assert!((cold.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!((hot.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tiny_probabilities_do_not_underflow() {
        let probs = [1e-30, 2e-30, 0.0];
        let dist = temperature_distribution(&probs, 0.01).unwrap();
        assert!(dist.iter().all(|d| d.is_finite()));
        assert!((dist[1] - 1.0).abs() < 1e-9);
        assert_eq!(dist[2], 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(temperature_distribution(&[0.5, 0.5], 0.0).is_err());
        assert!(temperature_distribution(&[0.5, 0.5], f64::NAN).is_err());
        assert!(temperature_distribution(&[0.0, 0.0], 1.0).is_err());
        assert!(temperature_distribution(&[], 1.0).is_err());
    }

    #[cfg(feature = "ndarray")]
    #[test]
    fn test_generate_text_length() {
        use crate::model::{CellKind, RecurrentLmConfig};
        use burn::backend::ndarray::{NdArray, NdArrayDevice};

        let mut vocab = CharVocab::new();
        vocab.build_from_text("abc");
        let model = RecurrentLmConfig::new(CellKind::Lstm, 3, vocab.size(), 4)
            .with_depth(1)
            .init::<NdArray<f32>>(&NdArrayDevice::default());

        let mut rng = StdRng::seed_from_u64(1);
        let text = generate_text(&model, &vocab, "abc", 25, 0.5, &mut rng).unwrap();
        assert_eq!(text.chars().count(), 25);
        assert!(text.chars().all(|c| "abc".contains(c)));

        assert!(generate_text(&model, &vocab, "ab", 5, 0.5, &mut rng).is_err());

        // Same seed and rng state give the same continuation
        let first = generate_text(&model, &vocab, "cab", 15, 0.7, &mut StdRng::seed_from_u64(9)).unwrap();
        let second = generate_text(&model, &vocab, "cab", 15, 0.7, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(first, second);
    }
}
