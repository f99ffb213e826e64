//! Neighborhood Predictor - k-nearest-neighbor rating prediction
//!
//! Predicts a rating for a (user, movie) pair from the ratings of the most
//! similar users (user mode) or the most similar movies the user rated
//! (item mode).
//!
//! ## Fallback chain
//! Both modes share one chain, applied in order until a step yields a value:
//! 1. Mean of the neighbors' observed ratings
//! 2. Mean of the target entity's own observed ratings (the user in user
//!    mode, the movie in item mode)
//! 3. Global mean of all training ratings
//!
//! An identifier with no training rating, whether absent from the codec or
//! addressed by it without any observed value, short-circuits to
//! [`Prediction::NoPrediction`] without consulting the chain.

use crate::cosine::{similarities, top_neighbors};
use crate::error::{Result, SimilarityError};
use crate::matrix::{RatingMatrices, observed_row_means};
use data_loader::{MovieId, Rating, RatingCodec, UserId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Which similarity matrix the neighbors come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    User,
    Item,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::User => f.write_str("user"),
            Mode::Item => f.write_str("item"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(Mode::User),
            "item" => Ok(Mode::Item),
            other => Err(format!("unknown mode '{}', expected 'user' or 'item'", other)),
        }
    }
}

/// Outcome of a neighborhood prediction, tagged with the step that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Prediction {
    Neighbors(f32),
    EntityMean(f32),
    GlobalMean(f32),
    /// The user or movie was not part of the training matrices
    NoPrediction,
}

impl Prediction {
    pub fn value(&self) -> Option<f32> {
        match *self {
            Prediction::Neighbors(v) | Prediction::EntityMean(v) | Prediction::GlobalMean(v) => {
                Some(v)
            }
            Prediction::NoPrediction => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Prediction::NoPrediction)
    }
}

/// Rating matrices, both similarity matrices and the fallback means
#[derive(Debug)]
pub struct SimilarityModel {
    codec: RatingCodec,
    matrices: RatingMatrices,
    user_similarity: Array2<f32>,
    item_similarity: Array2<f32>,
    user_means: Vec<Option<f32>>,
    item_means: Vec<Option<f32>>,
    global_mean: f32,
}

impl SimilarityModel {
    /// Build from training ratings with a codec fitted on them
    pub fn build(ratings: &[Rating]) -> Result<Self> {
        Self::build_with_codec(ratings, RatingCodec::fit(ratings))
    }

    /// Build from training ratings using an existing codec.
    ///
    /// The codec may address identifiers with no training rating. Those are
    /// cold: every prediction involving one is [`Prediction::NoPrediction`].
    #[instrument(skip(ratings, codec), fields(ratings = ratings.len()))]
    pub fn build_with_codec(ratings: &[Rating], codec: RatingCodec) -> Result<Self> {
        if ratings.is_empty() {
            return Err(SimilarityError::EmptyTrainingSet);
        }

        let matrices = RatingMatrices::build(ratings, &codec)?;
        let user_similarity = similarities(&matrices.user_item);
        let item_similarity = similarities(&matrices.item_user);
        let user_means = observed_row_means(&matrices.user_item);
        let item_means = observed_row_means(&matrices.item_user);
        let global_mean = ratings.iter().map(|r| r.rating).sum::<f32>() / ratings.len() as f32;

        info!(
            "Built similarity model: {} users, {} items, global mean {:.3}",
            matrices.n_users(),
            matrices.n_items(),
            global_mean
        );

        Ok(Self {
            codec,
            matrices,
            user_similarity,
            item_similarity,
            user_means,
            item_means,
            global_mean,
        })
    }

    pub fn codec(&self) -> &RatingCodec {
        &self.codec
    }

    pub fn matrices(&self) -> &RatingMatrices {
        &self.matrices
    }

    pub fn user_similarity(&self) -> &Array2<f32> {
        &self.user_similarity
    }

    pub fn item_similarity(&self) -> &Array2<f32> {
        &self.item_similarity
    }

    pub fn global_mean(&self) -> f32 {
        self.global_mean
    }
}

/// k-NN predictor over a shared [`SimilarityModel`]
#[derive(Debug, Clone)]
pub struct NeighborhoodPredictor {
    model: Arc<SimilarityModel>,
    k: usize,
    mode: Mode,
}

impl NeighborhoodPredictor {
    /// Create a predictor (defaults: k = 15, user mode)
    pub fn new(model: Arc<SimilarityModel>) -> Self {
        Self {
            model,
            k: 15,
            mode: Mode::User,
        }
    }

    /// Configure the neighborhood size
    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    /// Configure user- or item-based prediction
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn model(&self) -> &Arc<SimilarityModel> {
        &self.model
    }

    /// Predict with the configured `k` and mode
    pub fn predict(&self, user_id: UserId, movie_id: MovieId) -> Prediction {
        self.predict_with(user_id, movie_id, self.k, self.mode)
    }

    /// Predict a rating for `(user_id, movie_id)` using `k` neighbors
    pub fn predict_with(&self, user_id: UserId, movie_id: MovieId, k: usize, mode: Mode) -> Prediction {
        let model = &*self.model;
        let (Some(user), Some(item)) = (
            model.codec.user_index(user_id),
            model.codec.movie_index(movie_id),
        ) else {
            debug!("No prediction for user {} movie {}: cold identifier", user_id, movie_id);
            return Prediction::NoPrediction;
        };
        if model.user_means[user].is_none() || model.item_means[item].is_none() {
            debug!("No prediction for user {} movie {}: no training ratings", user_id, movie_id);
            return Prediction::NoPrediction;
        }

        let (neighbors, entity_mean) = match mode {
            Mode::User => {
                let neighbors = top_neighbors(&model.user_similarity, user, k);
                let ratings: Vec<f32> = neighbors
                    .iter()
                    .filter_map(|&(other, _)| model.matrices.observed(other, item))
                    .collect();
                (ratings, model.user_means[user])
            }
            Mode::Item => {
                let neighbors = top_neighbors(&model.item_similarity, item, k);
                let ratings: Vec<f32> = neighbors
                    .iter()
                    .filter_map(|&(other, _)| model.matrices.observed(user, other))
                    .collect();
                (ratings, model.item_means[item])
            }
        };

        fallback_chain(&neighbors, entity_mean, model.global_mean)
    }
}

/// Neighbor mean, then the entity's own mean, then the global mean
fn fallback_chain(neighbor_ratings: &[f32], entity_mean: Option<f32>, global_mean: f32) -> Prediction {
    if !neighbor_ratings.is_empty() {
        let mean = neighbor_ratings.iter().sum::<f32>() / neighbor_ratings.len() as f32;
        return Prediction::Neighbors(mean);
    }
    match entity_mean {
        Some(mean) => Prediction::EntityMean(mean),
        None => Prediction::GlobalMean(global_mean),
    }
}
