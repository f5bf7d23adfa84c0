//! Regression error metrics

use serde::{Deserialize, Serialize};

/// Agreement of predictions with reference values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ErrorMetrics {
    /// Coefficient of determination; 0 when the reference is constant
    pub r_squared: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Mean of prediction minus reference
    pub bias: f64,
    /// Samples scored
    pub count: usize,
}

impl ErrorMetrics {
    /// Score `predictions` against `targets`
    ///
    /// Extra elements of the longer slice are ignored. Empty input yields
    /// all-zero metrics with a count of zero.
    pub fn compute(predictions: &[f64], targets: &[f64]) -> Self {
        let n = predictions.len().min(targets.len());
        if n == 0 {
            return Self {
                r_squared: 0.0,
                rmse: 0.0,
                mae: 0.0,
                bias: 0.0,
                count: 0,
            };
        }
        let nf = n as f64;
        let mean_target = targets[..n].iter().sum::<f64>() / nf;

        let (mut ss_res, mut ss_tot, mut abs, mut signed) = (0.0, 0.0, 0.0, 0.0);
        for (p, t) in predictions[..n].iter().zip(&targets[..n]) {
            let err = p - t;
            ss_res += err * err;
            ss_tot += (t - mean_target) * (t - mean_target);
            abs += err.abs();
            signed += err;
        }

        Self {
            r_squared: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
            rmse: (ss_res / nf).sqrt(),
            mae: abs / nf,
            bias: signed / nf,
            count: n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn perfect_predictions() {
        let m = ErrorMetrics::compute(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.r_squared, 1.0);
        assert_eq!(m.count, 3);
    }

    #[test]
    fn constant_offset_shows_as_bias() {
        let m = ErrorMetrics::compute(&[3.0, 4.0, 5.0], &[1.0, 2.0, 3.0]);
        assert_eq!(m.bias, 2.0);
        assert_eq!(m.mae, 2.0);
        assert_eq!(m.rmse, 2.0);
    }

    #[test]
    fn constant_target_has_zero_r_squared() {
        let m = ErrorMetrics::compute(&[1.0, 2.0], &[2.0, 2.0]);
        assert_eq!(m.r_squared, 0.0);
        assert_eq!(ErrorMetrics::compute(&[], &[]).count, 0);
    }

    proptest! {
        #[test]
        fn error_norms_are_ordered(pairs in prop::collection::vec((-500.0f64..500.0, -500.0f64..500.0), 1..64)) {
            let (p, t): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            let m = ErrorMetrics::compute(&p, &t);
            // |mean| <= mean |.| <= rms
            prop_assert!(m.bias.abs() <= m.mae + 1e-9);
            prop_assert!(m.mae <= m.rmse + 1e-9);
            prop_assert!(m.r_squared <= 1.0 + 1e-12);
        }
    }
}
