//! # Data Loader Crate
//!
//! This crate owns the rating data of the MovieLens-100k recommender.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Rating, Movie, OverlayRecord, DataIndex)
//! - **parser**: Parse u.data / u.item and read/write the rating overlay
//! - **store**: Rating store merging base ratings with the overlay
//! - **codec**: Raw identifiers <-> dense indices for the models
//! - **index**: Catalog index, movie statistics and seed-movie selection
//! - **split**: Deterministic per-user train/held-out split
//! - **clean**: Offline conversion of the raw files to CSV
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{CsvOverlay, DataIndex, RatingCodec, RatingStore};
//! use std::path::Path;
//!
//! let data_dir = Path::new("data/ml-100k");
//! let store = RatingStore::open(data_dir, CsvOverlay::new(data_dir.join("new_ratings.csv")))?;
//! let ratings = store.load()?;
//!
//! let codec = RatingCodec::fit(&ratings);
//! let index = DataIndex::load_from_files(data_dir, &ratings)?;
//! println!("Seed movies: {:?}", index.most_rated_movies(20));
//! ```

pub mod clean;
pub mod codec;
pub mod error;
pub mod index;
pub mod parser;
pub mod split;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use clean::{CleanReport, clean};
pub use codec::{EntityKind, IdentifierCodec, RatingCodec};
pub use error::{DataLoadError, Result};
pub use split::{Split, stratified_split};
pub use store::{CsvOverlay, MemoryOverlay, OverlayStore, RatingStore, merge_ratings};
pub use types::{
    // Type aliases
    MovieId,
    UserId,
    // Core types
    DataIndex,
    Genre,
    Movie,
    MovieStats,
    OverlayRecord,
    Rating,
    RatingBounds,
    // Constants
    MAX_RATING,
    MIN_RATING,
};
