//! Core traits for the ranking pipeline.
//!
//! - [`Filter`]: composable candidate filters chained by a `FilterPipeline`
//! - [`RatingPredictor`]: anything that can score a (user, movie) pair,
//!   the seam the evaluation harness works against

use crate::types::{Candidate, RankingContext};
use anyhow::Result;
use data_loader::{MovieId, UserId};

/// Core trait for filtering candidates.
///
/// ## Design Note
/// - `Send + Sync` allows filters to be used in concurrent contexts
/// - Filters take ownership of the Vec<Candidate> and return a filtered Vec
pub trait Filter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    /// Apply this filter to a set of candidates.
    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>>;
}

/// Scores a single (user, movie) pair.
///
/// `None` means the predictor cannot say anything about the pair, e.g. a
/// cold identifier. Such pairs are excluded from evaluation.
pub trait RatingPredictor: Send + Sync {
    fn name(&self) -> &str;

    fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32>;
}
