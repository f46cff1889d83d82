// Temperature Sampler - Stochastic choice of the next vocabulary index
// Reweights a probability distribution by temperature, then draws one index

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use thiserror::Error;

/// Probabilities are floored to this before taking the logarithm
pub const PROBABILITY_FLOOR: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("Temperature must be finite and positive, got {0}")]
    InvalidTemperature(f64),

    #[error("Cannot sample from an empty distribution")]
    EmptyDistribution,

    #[error("Reweighted distribution is degenerate: {0}")]
    Degenerate(String),
}

/// Reject non-positive or non-finite temperatures
pub fn validate_temperature(temperature: f64) -> Result<(), SamplerError> {
    if temperature.is_finite() && temperature > 0.0 {
        Ok(())
    } else {
        Err(SamplerError::InvalidTemperature(temperature))
    }
}

/// Reweight a distribution by temperature.
///
/// Computes `softmax(ln(p) / T)`. The largest log-probability is subtracted
/// before dividing by `T`, so the arg-max weight is exactly one and tiny
/// temperatures cannot overflow. Low temperatures sharpen toward the
/// arg-max, high temperatures flatten toward uniform.
pub fn apply_temperature(probabilities: &[f64], temperature: f64) -> Result<Vec<f64>, SamplerError> {
    validate_temperature(temperature)?;
    if probabilities.is_empty() {
        return Err(SamplerError::EmptyDistribution);
    }

    let log_probs: Vec<f64> = probabilities
        .iter()
        .map(|&p| p.max(PROBABILITY_FLOOR).ln())
        .collect();

    let max_log = log_probs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let weights: Vec<f64> = log_probs
        .iter()
        .map(|&l| ((l - max_log) / temperature).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Draw one index from `probabilities` after temperature reweighting
pub fn sample_with_temperature<R: Rng + ?Sized>(
    probabilities: &[f64],
    temperature: f64,
    rng: &mut R,
) -> Result<usize, SamplerError> {
    let reweighted = apply_temperature(probabilities, temperature)?;
    let dist = WeightedIndex::new(&reweighted)
        .map_err(|e| SamplerError::Degenerate(e.to_string()))?;
    Ok(dist.sample(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DIST: [f64; 4] = [0.1, 0.2, 0.6, 0.1];

    #[test]
    fn test_rejects_bad_temperature() {
        let mut rng = StdRng::seed_from_u64(1);
        for t in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                sample_with_temperature(&DIST, t, &mut rng),
                Err(SamplerError::InvalidTemperature(_))
            ));
        }
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);

        let draws_a: Vec<usize> = (0..32)
            .map(|_| sample_with_temperature(&DIST, 0.9, &mut a).unwrap())
            .collect();
        let draws_b: Vec<usize> = (0..32)
            .map(|_| sample_with_temperature(&DIST, 0.9, &mut b).unwrap())
            .collect();

        assert_eq!(draws_a, draws_b);
    }

    #[test]
    fn test_low_temperature_picks_argmax() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            assert_eq!(sample_with_temperature(&DIST, 0.01, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_vanishing_temperature_stays_finite() {
        let reweighted = apply_temperature(&DIST, 1e-310).unwrap();
        assert_eq!(reweighted, vec![0.0, 0.0, 1.0, 0.0]);

        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            assert_eq!(sample_with_temperature(&DIST, 1e-310, &mut rng).unwrap(), 2);
        }
    }

    #[test]
    fn test_unit_temperature_preserves_distribution() {
        let reweighted = apply_temperature(&DIST, 1.0).unwrap();
        for (p, q) in DIST.iter().zip(&reweighted) {
            assert!((p - q).abs() < 1e-9);
        }
    }

    #[test]
    fn test_high_temperature_flattens() {
        let reweighted = apply_temperature(&DIST, 1000.0).unwrap();
        for q in reweighted {
            assert!((q - 0.25).abs() < 0.01);
        }
    }

    #[test]
    fn test_zero_probability_does_not_poison() {
        let dist = [0.0, 1.0, 0.0];
        let reweighted = apply_temperature(&dist, 0.5).unwrap();
        assert!(reweighted.iter().all(|q| q.is_finite()));
        assert!((reweighted.iter().sum::<f64>() - 1.0).abs() < 1e-9);

        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(sample_with_temperature(&dist, 0.5, &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_empty_distribution() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            sample_with_temperature(&[], 1.0, &mut rng),
            Err(SamplerError::EmptyDistribution)
        ));
    }
}
