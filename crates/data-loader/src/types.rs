//! Core domain types for the MovieLens-100k dataset and the rating overlay.
//!
//! This module defines the fundamental data structures used throughout the system.
//! Key Rust concepts demonstrated here:
//! - Type aliases for domain clarity (UserId, MovieId)
//! - Small `Copy` structs for records that are passed around by value
//! - Enums for fixed sets of values
//! - HashMap and BTreeMap for efficient lookups

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// =============================================================================
// Type Aliases
// =============================================================================
// These make the domain clearer and prevent mixing up user IDs with movie IDs

/// Raw identifier for a user (1-943 in MovieLens-100k, larger for registered users)
pub type UserId = u32;

/// Raw identifier for a movie (1-1682 in MovieLens-100k)
pub type MovieId = u32;

/// Lowest rating a user can give
pub const MIN_RATING: f32 = 1.0;

/// Highest rating a user can give
pub const MAX_RATING: f32 = 5.0;

// =============================================================================
// Rating Types
// =============================================================================

/// A single rating from a user for a movie.
///
/// Ratings are keyed on `(user_id, movie_id)`: when two records share a key,
/// the one merged in last wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value from 1.0 to 5.0
    pub rating: f32,
}

impl Rating {
    pub fn new(user_id: UserId, movie_id: MovieId, rating: f32) -> Self {
        Self {
            user_id,
            movie_id,
            rating,
        }
    }

    /// The de-duplication key of this rating
    pub fn key(&self) -> (UserId, MovieId) {
        (self.user_id, self.movie_id)
    }

    /// Whether the rating value lies in the accepted range
    pub fn is_valid(&self) -> bool {
        self.rating.is_finite() && (MIN_RATING..=MAX_RATING).contains(&self.rating)
    }
}

/// One row of the persisted rating overlay.
///
/// The dense indices are the ones assigned by the codec at the time the row
/// was written. They are informational: every training run re-derives indices
/// from the codec it fits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayRecord {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub rating: f32,
    #[serde(rename = "user_idx", default)]
    pub user_index: usize,
    #[serde(rename = "item_idx", default)]
    pub item_index: usize,
}

impl OverlayRecord {
    pub fn rating(&self) -> Rating {
        Rating::new(self.user_id, self.movie_id, self.rating)
    }
}

/// Minimum and maximum observed rating values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingBounds {
    pub min: f32,
    pub max: f32,
}

impl RatingBounds {
    /// Bounds observed over a set of ratings, `None` when the set is empty
    pub fn observed(ratings: &[Rating]) -> Option<Self> {
        let mut iter = ratings.iter().map(|r| r.rating);
        let first = iter.next()?;
        let (min, max) = iter.fold((first, first), |(lo, hi), r| (lo.min(r), hi.max(r)));
        Some(Self { min, max })
    }

    pub fn clamp(&self, value: f32) -> f32 {
        value.clamp(self.min, self.max)
    }
}

impl Default for RatingBounds {
    fn default() -> Self {
        Self {
            min: MIN_RATING,
            max: MAX_RATING,
        }
    }
}

// =============================================================================
// Movie-related Types
// =============================================================================

/// Represents a movie in the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Release date as written in `u.item` (e.g. "01-Jan-1995"), if present
    pub release_date: Option<String>,
    /// Year extracted from the title (e.g. "Toy Story (1995)")
    pub year: Option<u16>,
    pub genres: Vec<Genre>,
}

/// Movie genres from MovieLens, in `u.item` flag-column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Genre {
    Action,
    Adventure,
    Animation,
    Children,
    Comedy,
    Crime,
    Documentary,
    Drama,
    Fantasy,
    FilmNoir,
    Horror,
    Musical,
    Mystery,
    Romance,
    SciFi,
    Thriller,
    War,
    Western,
}

impl Genre {
    /// All genres in the order of the `u.item` flag columns (after "unknown")
    pub const ALL: [Genre; 18] = [
        Genre::Action,
        Genre::Adventure,
        Genre::Animation,
        Genre::Children,
        Genre::Comedy,
        Genre::Crime,
        Genre::Documentary,
        Genre::Drama,
        Genre::Fantasy,
        Genre::FilmNoir,
        Genre::Horror,
        Genre::Musical,
        Genre::Mystery,
        Genre::Romance,
        Genre::SciFi,
        Genre::Thriller,
        Genre::War,
        Genre::Western,
    ];

    /// Column label used by MovieLens
    pub fn label(&self) -> &'static str {
        match self {
            Genre::Action => "Action",
            Genre::Adventure => "Adventure",
            Genre::Animation => "Animation",
            Genre::Children => "Children's",
            Genre::Comedy => "Comedy",
            Genre::Crime => "Crime",
            Genre::Documentary => "Documentary",
            Genre::Drama => "Drama",
            Genre::Fantasy => "Fantasy",
            Genre::FilmNoir => "Film-Noir",
            Genre::Horror => "Horror",
            Genre::Musical => "Musical",
            Genre::Mystery => "Mystery",
            Genre::Romance => "Romance",
            Genre::SciFi => "Sci-Fi",
            Genre::Thriller => "Thriller",
            Genre::War => "War",
            Genre::Western => "Western",
        }
    }
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovieStats {
    pub avg_rating: f32,
    pub rating_count: u32,
    /// Popularity score derived from rating count and average
    pub popularity_score: f32,
}

// =============================================================================
// DataIndex - The Catalog
// =============================================================================

/// Catalog of movies plus the merged ratings, indexed for lookups.
///
/// Built once per load; the recommendation service rebuilds it after ingesting
/// ratings. It answers the questions the outer layers ask: which movies exist,
/// what a user rated, which movies are offered as seed movies.
#[derive(Debug)]
pub struct DataIndex {
    pub(crate) movies: HashMap<MovieId, Movie>,

    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each movie
    pub(crate) movie_ratings: BTreeMap<MovieId, Vec<Rating>>,

    pub(crate) movie_stats: HashMap<MovieId, MovieStats>,
}

impl DataIndex {
    /// Creates a new, empty DataIndex
    pub fn new() -> Self {
        Self {
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            movie_ratings: BTreeMap::new(),
            movie_stats: HashMap::new(),
        }
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Title of a movie, or a placeholder naming its id
    pub fn title_of(&self, id: MovieId) -> String {
        self.movies
            .get(&id)
            .map(|m| m.title.clone())
            .unwrap_or_else(|| format!("Movie {}", id))
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for a movie
    pub fn get_movie_ratings(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get precomputed statistics for a movie
    pub fn get_movie_stats(&self, movie_id: MovieId) -> Option<&MovieStats> {
        self.movie_stats.get(&movie_id)
    }

    /// Every movie id that appears in at least one rating, ascending
    pub fn all_movie_ids(&self) -> Vec<MovieId> {
        self.movie_ratings.keys().copied().collect()
    }

    /// Highest raw user id seen in the ratings
    pub fn max_user_id(&self) -> Option<UserId> {
        self.user_ratings.keys().copied().max()
    }

    /// Insert a movie into the index
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating and update indices
    pub fn insert_rating(&mut self, rating: Rating) {
        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);

        self.movie_ratings
            .entry(rating.movie_id)
            .or_default()
            .push(rating);
    }

    /// Get counts for debugging/validation: (movies, users, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        (self.movies.len(), self.user_ratings.len(), total_ratings)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}
