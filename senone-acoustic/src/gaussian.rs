//! Diagonal-covariance Gaussian mixtures (senones)

use std::f64::consts::PI;

use crate::logmath::{LogMath, LOG_ZERO};
use crate::pool::Pool;

/// Pools a mixture reads from while scoring
#[derive(Clone, Copy)]
pub struct MixtureParams<'a> {
    pub means: &'a Pool<Vec<f32>>,
    pub mixture_weights: &'a Pool<Vec<f32>>,
    pub log_math: &'a LogMath,
}

/// One Gaussian of a mixture
///
/// The mean is read from its pool on every score. The variance is folded
/// into `neg_half_precision` and `log_norm`, so `precompute_distance` must
/// run after every variance change.
#[derive(Debug, Clone, PartialEq)]
pub struct MixtureComponent {
    pub mean_id: usize,
    pub variance_id: usize,
    neg_half_precision: Vec<f64>,
    log_norm: f64,
}

impl MixtureComponent {
    pub fn new(mean_id: usize, variance_id: usize, variance: &[f32]) -> Self {
        let mut component = Self {
            mean_id,
            variance_id,
            neg_half_precision: Vec::new(),
            log_norm: 0.0,
        };
        component.precompute_distance(variance);
        component
    }

    /// Recompute the variance-dependent terms
    pub fn precompute_distance(&mut self, variance: &[f32]) {
        self.neg_half_precision = variance.iter().map(|&v| -0.5 / v as f64).collect();
        self.log_norm = -0.5 * variance.iter().map(|&v| (2.0 * PI * v as f64).ln()).sum::<f64>();
    }

    /// `-0.5 * Σ ln(2π σ²_i)`
    pub fn log_norm(&self) -> f64 {
        self.log_norm
    }

    /// Natural-log density of `feature`
    pub fn ln_score(&self, feature: &[f32], mean: &[f32]) -> f64 {
        let distance: f64 = feature
            .iter()
            .zip(mean)
            .zip(&self.neg_half_precision)
            .map(|((&x, &m), &k)| {
                let d = x as f64 - m as f64;
                d * d * k
            })
            .sum();
        self.log_norm + distance
    }

    /// Density of `feature` in the model's log base
    pub fn score(&self, feature: &[f32], params: &MixtureParams<'_>) -> f32 {
        let mean = params.means.get(self.mean_id);
        params.log_math.ln_to_log(self.ln_score(feature, mean))
    }
}

/// A senone: weighted mixture of Gaussians
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianMixture {
    id: usize,
    weights_id: usize,
    components: Vec<MixtureComponent>,
}

impl GaussianMixture {
    pub fn new(id: usize, weights_id: usize, components: Vec<MixtureComponent>) -> Self {
        Self {
            id,
            weights_id,
            components,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Row of the mixture weight pool holding this senone's weights
    pub fn weights_id(&self) -> usize {
        self.weights_id
    }

    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut [MixtureComponent] {
        &mut self.components
    }

    /// Log likelihood of `feature` under the mixture
    pub fn score(&self, feature: &[f32], params: &MixtureParams<'_>) -> f32 {
        let weights = params.mixture_weights.get(self.weights_id);
        let log_math = params.log_math;

        self.components
            .iter()
            .zip(weights)
            .filter(|(_, w)| **w != LOG_ZERO)
            .fold(LOG_ZERO, |total, (component, &w)| {
                log_math.add_as_linear(total, component.score(feature, params) + w)
            })
    }

    /// Weighted log score of every component; LOG_ZERO where the weight is
    pub fn component_scores(&self, feature: &[f32], params: &MixtureParams<'_>) -> Vec<f32> {
        let weights = params.mixture_weights.get(self.weights_id);

        self.components
            .iter()
            .zip(weights)
            .map(|(component, &w)| {
                if w == LOG_ZERO {
                    LOG_ZERO
                } else {
                    component.score(feature, params) + w
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    struct Fixture {
        means: Pool<Vec<f32>>,
        weights: Pool<Vec<f32>>,
        log_math: LogMath,
    }

    impl Fixture {
        fn params(&self) -> MixtureParams<'_> {
            MixtureParams {
                means: &self.means,
                mixture_weights: &self.weights,
                log_math: &self.log_math,
            }
        }
    }

    fn fixture(weights: Vec<f64>) -> (Fixture, GaussianMixture) {
        let log_math = LogMath::natural();
        let mut means = Pool::new("means");
        means.put(0, vec![0.0, 0.0]);
        means.put(1, vec![4.0, 4.0]);
        let mut weight_pool = Pool::new("mixture_weights");
        weight_pool.put(0, weights.iter().map(|&w| log_math.linear_to_log(w)).collect());

        let components = vec![
            MixtureComponent::new(0, 0, &[1.0, 1.0]),
            MixtureComponent::new(1, 1, &[2.0, 2.0]),
        ];
        let mixture = GaussianMixture::new(7, 0, components);

        (
            Fixture {
                means,
                weights: weight_pool,
                log_math,
            },
            mixture,
        )
    }

    #[test]
    fn test_standard_normal_peak() {
        let component = MixtureComponent::new(0, 0, &[1.0]);
        assert_relative_eq!(component.ln_score(&[0.0], &[0.0]), -0.5 * (2.0 * PI).ln(), epsilon = 1e-12);
        assert_relative_eq!(
            component.ln_score(&[1.0], &[0.0]),
            -0.5 * (2.0 * PI).ln() - 0.5,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_score_at_mean_is_peak() {
        let component = MixtureComponent::new(0, 0, &[0.5, 2.0, 1.0]);
        let mean = [1.0, -2.0, 3.0];
        let peak = component.ln_score(&mean, &mean);

        for offset in [0.01_f32, 0.1, 1.0, -0.5] {
            let shifted: Vec<f32> = mean.iter().map(|m| m + offset).collect();
            assert!(component.ln_score(&shifted, &mean) < peak);
        }
        assert_relative_eq!(peak, component.log_norm(), epsilon = 1e-12);
    }

    #[test]
    fn test_precompute_tracks_variance() {
        let mut component = MixtureComponent::new(0, 0, &[1.0]);
        let before = component.ln_score(&[0.0], &[0.0]);
        component.precompute_distance(&[4.0]);
        assert_relative_eq!(component.ln_score(&[0.0], &[0.0]), before - 0.5 * 4.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_mixture_is_weighted_sum() {
        let (f, mixture) = fixture(vec![0.25, 0.75]);
        let params = f.params();
        let x = [1.0, 2.0];

        let c0 = mixture.components()[0].score(&x, &params) as f64;
        let c1 = mixture.components()[1].score(&x, &params) as f64;
        let expected = (0.25 * c0.exp() + 0.75 * c1.exp()).ln();

        assert_relative_eq!(mixture.score(&x, &params) as f64, expected, epsilon = 1e-4);
        assert_eq!(mixture.id(), 7);
    }

    #[test]
    fn test_zero_weight_component_ignored() {
        let (f, mixture) = fixture(vec![1.0, 0.0]);
        let params = f.params();
        let x = [4.0, 4.0];

        let only_first = mixture.components()[0].score(&x, &params);
        assert_relative_eq!(mixture.score(&x, &params), only_first, epsilon = 1e-4);

        let components = mixture.component_scores(&x, &params);
        assert_eq!(components[1], LOG_ZERO);
        assert_relative_eq!(components[0], only_first, epsilon = 1e-4);
    }
}
