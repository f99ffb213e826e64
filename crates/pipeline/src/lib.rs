//! Ranking and evaluation on top of the trained models.
//!
//! This crate provides:
//! - The `Filter` trait with already-rated and known-item filters
//! - FilterPipeline for composing filters
//! - The recommendation ranker (top-N unrated movies for a user)
//! - `RatingPredictor`, the seam both model families plug into
//! - The evaluation harness (RMSE / MAE on held-out ratings)
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{evaluate, recommend, ArtifactPredictor};
//!
//! let top = recommend(&artifact, user_id, &rated, &all_movie_ids, 10, ScorePolicy::ClampToBounds)?;
//! let metrics = evaluate(&ArtifactPredictor::new(artifact.clone()), &held_out);
//! ```

pub mod evaluation;
pub mod filter_pipeline;
pub mod filters;
pub mod predictors;
pub mod ranker;
pub mod traits;
pub mod types;

// Re-export main types
pub use evaluation::{EvaluationMetrics, evaluate};
pub use filter_pipeline::FilterPipeline;
pub use predictors::ArtifactPredictor;
pub use ranker::{recommend, sort_recommendations};
pub use traits::{Filter, RatingPredictor};
pub use types::{Candidate, RankingContext, Recommendation};
