//! # Similarity Crate
//!
//! Memory-based collaborative filtering over the MovieLens ratings.
//!
//! ## Pipeline
//! 1. **matrix**: pivot ratings into dense user x item / item x user matrices
//!    addressed through the [`RatingCodec`](data_loader::RatingCodec)
//! 2. **cosine**: pairwise cosine similarity of the matrix rows (Rayon)
//! 3. **neighborhood**: k-nearest-neighbor prediction with a shared
//!    fallback chain for user and item mode
//!
//! ## Example
//! ```ignore
//! let model = Arc::new(SimilarityModel::build(&train)?);
//! let predictor = NeighborhoodPredictor::new(model).with_k(15).with_mode(Mode::Item);
//! if let Some(rating) = predictor.predict(1, 20).value() {
//!     println!("Predicted {:.2}", rating);
//! }
//! ```

pub mod cosine;
pub mod error;
pub mod matrix;
pub mod neighborhood;

pub use cosine::{similarities, top_neighbors};
pub use error::{Result, SimilarityError};
pub use matrix::{RatingMatrices, UNOBSERVED};
pub use neighborhood::{Mode, NeighborhoodPredictor, Prediction, SimilarityModel};
