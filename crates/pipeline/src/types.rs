//! Candidate and context types flowing through the ranking pipeline.

use data_loader::{MovieId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A movie under consideration for one user
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub movie_id: MovieId,
    /// Dense item index, filled in once the movie is matched against a codec
    pub item_index: Option<usize>,
}

impl Candidate {
    pub fn new(movie_id: MovieId) -> Self {
        Self {
            movie_id,
            item_index: None,
        }
    }
}

/// What the pipeline knows about the user being ranked for
#[derive(Debug, Clone)]
pub struct RankingContext {
    pub user_id: UserId,
    pub rated_movies: HashSet<MovieId>,
}

impl RankingContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            rated_movies: HashSet::new(),
        }
    }

    pub fn with_rated(mut self, rated: impl IntoIterator<Item = MovieId>) -> Self {
        self.rated_movies.extend(rated);
        self
    }
}

/// One entry of a top-N list
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub movie_id: MovieId,
    pub predicted_rating: f32,
}
