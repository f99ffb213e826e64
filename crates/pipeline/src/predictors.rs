//! [`RatingPredictor`] implementations for both model families.

use crate::traits::RatingPredictor;
use data_loader::{MovieId, UserId};
use embedding::{ScorePolicy, TrainedArtifact};
use similarity::NeighborhoodPredictor;
use std::sync::Arc;

impl RatingPredictor for NeighborhoodPredictor {
    fn name(&self) -> &str {
        "neighborhood"
    }

    fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        NeighborhoodPredictor::predict(self, user_id, movie_id).value()
    }
}

/// Serves a trained artifact under a fixed score policy
#[derive(Debug, Clone)]
pub struct ArtifactPredictor {
    artifact: Arc<TrainedArtifact>,
    policy: ScorePolicy,
}

impl ArtifactPredictor {
    pub fn new(artifact: Arc<TrainedArtifact>) -> Self {
        Self {
            artifact,
            policy: ScorePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ScorePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl RatingPredictor for ArtifactPredictor {
    fn name(&self) -> &str {
        "embedding"
    }

    /// Pairs outside the artifact's codec have no prediction
    fn predict(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        self.artifact.predict(user_id, movie_id, self.policy).ok()
    }
}
