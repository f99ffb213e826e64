//! Evaluation Harness - RMSE / MAE against held-out ratings.

use crate::traits::RatingPredictor;
use data_loader::Rating;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Error metrics over the pairs a predictor could score.
///
/// `n` counts scored pairs only; both metrics are `None` when `n == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub rmse: Option<f32>,
    pub mae: Option<f32>,
    pub n: usize,
    /// Held-out ratings that got no prediction
    pub skipped: usize,
}

/// Score every held-out rating, skipping pairs without a prediction
#[instrument(skip_all, fields(predictor = predictor.name(), held_out = held_out.len()))]
pub fn evaluate<P: RatingPredictor + ?Sized>(predictor: &P, held_out: &[Rating]) -> EvaluationMetrics {
    let (squared, absolute, n) = held_out
        .par_iter()
        .filter_map(|rating| {
            let predicted = predictor.predict(rating.user_id, rating.movie_id)?;
            let error = (predicted - rating.rating) as f64;
            Some((error * error, error.abs(), 1usize))
        })
        .reduce(|| (0.0, 0.0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));

    let metrics = if n == 0 {
        EvaluationMetrics {
            skipped: held_out.len(),
            ..Default::default()
        }
    } else {
        EvaluationMetrics {
            rmse: Some((squared / n as f64).sqrt() as f32),
            mae: Some((absolute / n as f64) as f32),
            n,
            skipped: held_out.len() - n,
        }
    };

    info!(
        "Evaluated {}: rmse={:?} mae={:?} n={} skipped={}",
        predictor.name(),
        metrics.rmse,
        metrics.mae,
        metrics.n,
        metrics.skipped
    );
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{MovieId, UserId};

    /// Predicts 3.0 for every movie except 99
    struct Constant;

    impl RatingPredictor for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn predict(&self, _user_id: UserId, movie_id: MovieId) -> Option<f32> {
            (movie_id != 99).then_some(3.0)
        }
    }

    #[test]
    fn test_empty_held_out_set() {
        let metrics = evaluate(&Constant, &[]);
        assert_eq!(metrics.n, 0);
        assert!(metrics.rmse.is_none());
        assert!(metrics.mae.is_none());
    }

    #[test]
    fn test_metrics_skip_unpredictable_pairs() {
        let held_out = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(1, 2, 2.0),
            Rating::new(1, 99, 1.0),
        ];
        let metrics = evaluate(&Constant, &held_out);

        assert_eq!(metrics.n, 2);
        assert_eq!(metrics.skipped, 1);
        // errors 2 and 1: rmse sqrt(5/2), mae 1.5
        assert!((metrics.rmse.unwrap() - 2.5f32.sqrt()).abs() < 1e-6);
        assert!((metrics.mae.unwrap() - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_only_unpredictable_pairs() {
        let metrics = evaluate(&Constant, &[Rating::new(1, 99, 4.0)]);
        assert_eq!(metrics.n, 0);
        assert_eq!(metrics.skipped, 1);
        assert!(metrics.rmse.is_none());
    }
}
