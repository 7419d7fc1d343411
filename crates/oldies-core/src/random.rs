//! Random number sources with a common interface.
//!
//! The export engine never samples anything itself: the only place a
//! distribution shows up is a fixed-number connector whose count varies per
//! cell, which the exporter rejects. The sources still have to be real so
//! that callers can build and hand over a [`RandomDistribution`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Poisson, Uniform};
use serde::{Deserialize, Serialize};

use crate::{OldiesError, Result};

/// Result of a draw: one value for `n == 1`, a sequence otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Draw {
    Scalar(f64),
    Sequence(Vec<f64>),
}

impl Draw {
    /// Number of values drawn
    pub fn len(&self) -> usize {
        match self {
            Draw::Scalar(_) => 1,
            Draw::Sequence(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<f64> {
        match self {
            Draw::Scalar(v) => vec![v],
            Draw::Sequence(values) => values,
        }
    }
}

/// Common interface of all random sources
pub trait RandomSource {
    /// Draw `n` values from the named distribution.
    ///
    /// `n == 1` gives [`Draw::Scalar`], `n > 1` gives [`Draw::Sequence`],
    /// `n == 0` is an error.
    fn next(&mut self, n: usize, distribution: &str, parameters: &[f64]) -> Result<Draw>;

    /// Seed the source was created with, if any
    fn seed(&self) -> Option<u64>;
}

// ============================================================================
// DISTRIBUTIONS
// ============================================================================

/// Supported distributions, parameterised like numpy.random
#[derive(Debug, Clone)]
enum Sampler {
    /// uniform(low=0, high=1)
    Uniform(Uniform<f64>),
    /// normal(loc=0, scale=1)
    Normal(Normal<f64>),
    /// exponential(scale=1)
    Exponential(Exp<f64>),
    /// lognormal(mean=0, sigma=1)
    LogNormal(LogNormal<f64>),
    /// gamma(shape, scale=1)
    Gamma(Gamma<f64>),
    /// poisson(lam=1)
    Poisson(Poisson<f64>),
}

/// Names accepted by [`RandomSource::next`]
pub const DISTRIBUTIONS: &[&str] = &[
    "uniform",
    "normal",
    "exponential",
    "lognormal",
    "gamma",
    "poisson",
];

impl Sampler {
    fn build(name: &str, parameters: &[f64]) -> Result<Self> {
        let invalid = |e: String| {
            OldiesError::InvalidArgument(format!(
                "{} distribution with parameters {:?}: {}",
                name, parameters, e
            ))
        };
        let arity = |max: usize| {
            if parameters.len() > max {
                Err(invalid(format!("expected at most {} parameters", max)))
            } else {
                Ok(())
            }
        };
        let param = |i: usize, default: f64| parameters.get(i).copied().unwrap_or(default);

        match name {
            "uniform" => {
                arity(2)?;
                let (low, high) = (param(0, 0.0), param(1, 1.0));
                if !(low < high) || !low.is_finite() || !high.is_finite() {
                    return Err(invalid("low must be below high".into()));
                }
                Ok(Sampler::Uniform(Uniform::new(low, high)))
            }
            "normal" => {
                arity(2)?;
                Normal::new(param(0, 0.0), param(1, 1.0))
                    .map(Sampler::Normal)
                    .map_err(|e| invalid(e.to_string()))
            }
            "exponential" => {
                arity(1)?;
                let scale = param(0, 1.0);
                if !(scale > 0.0) {
                    return Err(invalid("scale must be positive".into()));
                }
                Exp::new(1.0 / scale)
                    .map(Sampler::Exponential)
                    .map_err(|e| invalid(e.to_string()))
            }
            "lognormal" => {
                arity(2)?;
                LogNormal::new(param(0, 0.0), param(1, 1.0))
                    .map(Sampler::LogNormal)
                    .map_err(|e| invalid(e.to_string()))
            }
            "gamma" => {
                if parameters.is_empty() {
                    return Err(invalid("shape is required".into()));
                }
                arity(2)?;
                Gamma::new(param(0, 1.0), param(1, 1.0))
                    .map(Sampler::Gamma)
                    .map_err(|e| invalid(e.to_string()))
            }
            "poisson" => {
                arity(1)?;
                Poisson::new(param(0, 1.0))
                    .map(Sampler::Poisson)
                    .map_err(|e| invalid(e.to_string()))
            }
            other => Err(OldiesError::InvalidArgument(format!(
                "unknown distribution {:?}, expected one of {:?}",
                other, DISTRIBUTIONS
            ))),
        }
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        match self {
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Normal(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
            Sampler::Poisson(d) => d.sample(rng),
        }
    }
}

// ============================================================================
// SOURCES
// ============================================================================

/// Seedable pseudo-random source backed by [`StdRng`]
#[derive(Debug, Clone)]
pub struct SeededRng {
    seed: Option<u64>,
    rng: StdRng,
}

impl SeededRng {
    /// Seeded from `seed`, or from system entropy when `None`
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { seed, rng }
    }
}

impl Default for SeededRng {
    fn default() -> Self {
        Self::new(None)
    }
}

impl RandomSource for SeededRng {
    fn next(&mut self, n: usize, distribution: &str, parameters: &[f64]) -> Result<Draw> {
        if n == 0 {
            return Err(OldiesError::InvalidArgument(
                "the sample number must be positive".into(),
            ));
        }
        let sampler = Sampler::build(distribution, parameters)?;
        if n == 1 {
            return Ok(Draw::Scalar(sampler.sample(&mut self.rng)));
        }
        Ok(Draw::Sequence(
            (0..n).map(|_| sampler.sample(&mut self.rng)).collect(),
        ))
    }

    fn seed(&self) -> Option<u64> {
        self.seed
    }
}

/// A distribution bound to a random source
#[derive(Debug, Clone)]
pub struct RandomDistribution {
    name: String,
    parameters: Vec<f64>,
    rng: SeededRng,
}

impl RandomDistribution {
    /// Bind `name`/`parameters` to `rng` (a fresh entropy-seeded source if `None`).
    ///
    /// The distribution is validated here so that a bad name fails early.
    pub fn new(name: &str, parameters: Vec<f64>, rng: Option<SeededRng>) -> Result<Self> {
        Sampler::build(name, &parameters)?;
        Ok(Self {
            name: name.to_string(),
            parameters,
            rng: rng.unwrap_or_default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    /// Draw `n` values
    pub fn next(&mut self, n: usize) -> Result<Draw> {
        self.rng.next(n, &self.name, &self.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_and_sequence() {
        let mut rng = SeededRng::new(Some(42));
        assert!(matches!(rng.next(1, "uniform", &[]).unwrap(), Draw::Scalar(_)));

        let draw = rng.next(5, "normal", &[0.0, 2.0]).unwrap();
        assert!(matches!(draw, Draw::Sequence(_)));
        assert_eq!(draw.len(), 5);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let mut rng = SeededRng::new(Some(1));
        assert!(matches!(
            rng.next(0, "uniform", &[]),
            Err(OldiesError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_uniform_bounds() {
        let mut rng = SeededRng::new(Some(7));
        let values = rng.next(200, "uniform", &[-1.0, 3.0]).unwrap().into_vec();
        assert!(values.iter().all(|&v| (-1.0..3.0).contains(&v)));
    }

    #[test]
    fn test_seeded_reproducibility() {
        let mut a = SeededRng::new(Some(12345));
        let mut b = SeededRng::new(Some(12345));
        assert_eq!(
            a.next(10, "exponential", &[2.0]).unwrap(),
            b.next(10, "exponential", &[2.0]).unwrap()
        );
        assert_eq!(a.seed(), Some(12345));
    }

    #[test]
    fn test_invalid_distributions() {
        let mut rng = SeededRng::new(Some(3));
        assert!(rng.next(1, "cauchy", &[]).is_err());
        assert!(rng.next(1, "uniform", &[1.0, 0.0]).is_err());
        assert!(rng.next(1, "normal", &[0.0, 1.0, 2.0]).is_err());
        assert!(rng.next(1, "gamma", &[]).is_err());
        assert!(rng.next(1, "exponential", &[0.0]).is_err());
    }

    #[test]
    fn test_random_distribution() {
        let mut dist =
            RandomDistribution::new("poisson", vec![4.0], Some(SeededRng::new(Some(9)))).unwrap();
        assert_eq!(dist.name(), "poisson");
        assert_eq!(dist.parameters(), &[4.0]);
        let values = dist.next(20).unwrap().into_vec();
        assert!(values.iter().all(|&v| v >= 0.0 && v.fract() == 0.0));

        assert!(RandomDistribution::new("binomial", vec![], None).is_err());
    }
}
