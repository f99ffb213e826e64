//! DataIndex building and indexing logic.
//!
//! This module builds the catalog from parsed movies and merged ratings:
//! - Primary indices (movies, ratings by user, ratings by movie)
//! - Aggregate statistics per movie
//! - Seed-movie selection for newly registered users

use crate::error::{DataLoadError, Result};
use crate::parser;
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::{info, warn};

impl DataIndex {
    /// Load `u.item` from `data_dir` and index it together with `ratings`
    ///
    /// The ratings come from the rating store, already merged with the overlay.
    pub fn load_from_files(data_dir: &Path, ratings: &[Rating]) -> Result<Self> {
        let movies = parser::parse_movies(&data_dir.join("u.item"))?;
        info!(
            "Loaded {} movies from {:?}, indexing {} ratings",
            movies.len(),
            data_dir,
            ratings.len()
        );
        Self::from_parts(movies, ratings)
    }

    /// Build the full index from parsed movies and ratings
    pub fn from_parts(movies: Vec<Movie>, ratings: &[Rating]) -> Result<Self> {
        let mut index = DataIndex::new();

        for movie in movies {
            index.insert_movie(movie);
        }
        for &rating in ratings {
            index.insert_rating(rating);
        }

        index.compute_movie_stats();
        index.validate()?;
        Ok(index)
    }

    /// Compute aggregate statistics for all rated movies
    ///
    /// For each movie: average rating, rating count, and a popularity score
    /// of `avg_rating * ln(rating_count + 1)`.
    pub fn compute_movie_stats(&mut self) {
        let movie_stats = self
            .movie_ratings
            .par_iter()
            .map(|(&movie_id, ratings)| {
                let rating_count = ratings.len() as u32;
                let avg_rating = if rating_count > 0 {
                    let total: f32 = ratings.iter().map(|r| r.rating).sum();
                    total / rating_count as f32
                } else {
                    0.0
                };
                let popularity_score = compute_popularity_score(avg_rating, rating_count);

                (
                    movie_id,
                    MovieStats {
                        avg_rating,
                        rating_count,
                        popularity_score,
                    },
                )
            })
            .collect();
        self.movie_stats = movie_stats;
    }

    /// The `n` movies with the most ratings, ties broken by ascending id.
    ///
    /// These are the seed movies a new user is asked to rate.
    pub fn most_rated_movies(&self, n: usize) -> Vec<MovieId> {
        let mut counted: Vec<(MovieId, usize)> = self
            .movie_ratings
            .iter()
            .map(|(&movie_id, ratings)| (movie_id, ratings.len()))
            .collect();
        counted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counted.into_iter().take(n).map(|(movie_id, _)| movie_id).collect()
    }

    /// Validate data integrity
    ///
    /// Every rating must be in the accepted range. Ratings for movies missing
    /// from a non-empty catalog are logged, not rejected: the overlay may
    /// reference movies the catalog file does not list.
    pub fn validate(&self) -> Result<()> {
        let mut missing = 0usize;
        for ratings in self.user_ratings.values() {
            for rating in ratings {
                if !rating.is_valid() {
                    return Err(DataLoadError::InvalidValue {
                        field: "rating".to_string(),
                        value: rating.rating.to_string(),
                    });
                }
                if !self.movies.is_empty() && !self.movies.contains_key(&rating.movie_id) {
                    missing += 1;
                }
            }
        }
        if missing > 0 {
            warn!("{} ratings reference movies absent from the catalog", missing);
        }
        Ok(())
    }
}

/// Helper function to compute popularity score
///
/// `avg_rating * ln(rating_count + 1)` rewards both high ratings and many ratings
fn compute_popularity_score(avg_rating: f32, rating_count: u32) -> f32 {
    avg_rating * (rating_count as f32 + 1.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(id: MovieId, title: &str) -> Movie {
        Movie {
            id,
            title: title.to_string(),
            release_date: None,
            year: None,
            genres: vec![Genre::Drama],
        }
    }

    #[test]
    fn test_popularity_score() {
        let score1 = compute_popularity_score(4.5, 10);
        let score2 = compute_popularity_score(3.5, 1000);

        assert!(score1 > 0.0);
        assert!(score2 > score1);
    }

    #[test]
    fn test_from_parts_computes_stats() {
        let ratings = vec![
            Rating::new(1, 1, 5.0),
            Rating::new(2, 1, 3.0),
            Rating::new(1, 2, 4.0),
        ];
        let index = DataIndex::from_parts(vec![movie(1, "A"), movie(2, "B")], &ratings).unwrap();

        let stats = index.get_movie_stats(1).unwrap();
        assert_eq!(stats.rating_count, 2);
        assert!((stats.avg_rating - 4.0).abs() < 1e-6);
        assert_eq!(index.get_user_ratings(1).len(), 2);
        assert_eq!(index.all_movie_ids(), vec![1, 2]);
        assert_eq!(index.max_user_id(), Some(2));
    }

    #[test]
    fn test_most_rated_movies_tie_break() {
        let ratings = vec![
            Rating::new(1, 3, 5.0),
            Rating::new(2, 3, 3.0),
            Rating::new(1, 2, 4.0),
            Rating::new(1, 1, 4.0),
        ];
        let index = DataIndex::from_parts(Vec::new(), &ratings).unwrap();

        assert_eq!(index.most_rated_movies(2), vec![3, 1]);
        assert_eq!(index.most_rated_movies(10), vec![3, 1, 2]);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let ratings = vec![Rating::new(1, 1, 9.0)];
        assert!(DataIndex::from_parts(Vec::new(), &ratings).is_err());
    }

    #[test]
    fn test_title_fallback() {
        let index = DataIndex::from_parts(vec![movie(1, "Known (1990)")], &[]).unwrap();
        assert_eq!(index.title_of(1), "Known (1990)");
        assert_eq!(index.title_of(7), "Movie 7");
    }
}
