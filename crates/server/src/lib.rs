//! Server crate for the ReelRecs recommendation engine.
//!
//! This crate contains the service that coordinates the rating store, model
//! training and ranking, plus the collaborators it is handed: configuration,
//! key-value stores, accounts and the poster cache.

pub mod accounts;
pub mod config;
pub mod error;
pub mod kv;
pub mod posters;
pub mod service;

pub use accounts::{Account, AccountStore};
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use kv::{JsonFileStore, KeyValueStore, MemoryStore};
pub use posters::{PosterCache, PosterLookup, TmdbClient};
pub use service::{
    MIN_SEED_RATINGS, MovieRecommendation, RatedMovie, RecommendationService, SeedMovie,
    ServiceStatus, TrainingOutcome,
};
