//! Service configuration loaded from the environment.
//!
//! Every field has a default, so an empty environment yields a working
//! configuration pointed at `data/ml-100k`. Variables use the `RECO_` prefix
//! (`RECO_DATA_DIR`, `RECO_EPOCHS`, ...) and may come from a `.env` file.

use crate::error::{Result, ServiceError};
use embedding::{Hyperparameters, ScorePolicy};
use serde::Deserialize;
use similarity::Mode;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for [`RecommendationService`](crate::RecommendationService)
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Directory holding `u.data` and `u.item`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Rating overlay CSV
    #[serde(default = "default_overlay_path")]
    pub overlay_path: PathBuf,

    /// Trained artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    #[serde(default = "default_accounts_path")]
    pub accounts_path: PathBuf,

    #[serde(default = "default_poster_cache_path")]
    pub poster_cache_path: PathBuf,

    /// TMDB API key; poster lookups are disabled without one
    #[serde(default)]
    pub tmdb_api_key: Option<String>,

    #[serde(default = "default_tmdb_base_url")]
    pub tmdb_base_url: String,

    #[serde(default = "default_tmdb_image_base")]
    pub tmdb_image_base: String,

    #[serde(default = "default_poster_timeout_secs")]
    pub poster_timeout_secs: u64,

    /// Neighborhood size for the similarity baseline
    #[serde(default = "default_k")]
    pub k: usize,

    #[serde(default)]
    pub neighborhood_mode: Mode,

    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_embedding_dim")]
    pub embedding_dim: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    #[serde(default = "default_dropout")]
    pub dropout: f32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_top_n")]
    pub top_n: usize,

    #[serde(default)]
    pub score_policy: ScorePolicy,

    /// Share of each user's ratings held out by evaluation splits
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/ml-100k")
}

fn default_overlay_path() -> PathBuf {
    PathBuf::from("data/new_ratings.csv")
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/mlp_model.json")
}

fn default_accounts_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_poster_cache_path() -> PathBuf {
    PathBuf::from("data/poster_cache.json")
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_string()
}

fn default_tmdb_image_base() -> String {
    "https://image.tmdb.org/t/p/w500".to_string()
}

fn default_poster_timeout_secs() -> u64 {
    5
}

fn default_k() -> usize {
    15
}

fn default_epochs() -> usize {
    5
}

fn default_batch_size() -> usize {
    64
}

fn default_embedding_dim() -> usize {
    50
}

fn default_learning_rate() -> f32 {
    0.001
}

fn default_dropout() -> f32 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_top_n() -> usize {
    10
}

fn default_test_fraction() -> f32 {
    0.2
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            overlay_path: default_overlay_path(),
            model_path: default_model_path(),
            accounts_path: default_accounts_path(),
            poster_cache_path: default_poster_cache_path(),
            tmdb_api_key: None,
            tmdb_base_url: default_tmdb_base_url(),
            tmdb_image_base: default_tmdb_image_base(),
            poster_timeout_secs: default_poster_timeout_secs(),
            k: default_k(),
            neighborhood_mode: Mode::default(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            embedding_dim: default_embedding_dim(),
            learning_rate: default_learning_rate(),
            dropout: default_dropout(),
            seed: default_seed(),
            top_n: default_top_n(),
            score_policy: ScorePolicy::default(),
            test_fraction: default_test_fraction(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `RECO_*` environment variables
    ///
    /// The TMDB key falls back to the unprefixed `TMDB_API_KEY`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let mut config = envy::prefixed("RECO_")
            .from_env::<ServiceConfig>()
            .map_err(|e| ServiceError::Config(format!("Failed to load config: {}", e)))?;
        if config.tmdb_api_key.is_none() {
            config.tmdb_api_key = std::env::var("TMDB_API_KEY").ok().filter(|k| !k.is_empty());
        }
        Ok(config)
    }

    /// Training settings derived from this configuration
    pub fn hyperparameters(&self) -> Hyperparameters {
        Hyperparameters::new()
            .with_epochs(self.epochs)
            .with_batch_size(self.batch_size)
            .with_embedding_dim(self.embedding_dim)
            .with_learning_rate(self.learning_rate)
            .with_dropout(self.dropout)
            .with_seed(self.seed)
    }

    pub fn poster_timeout(&self) -> Duration {
        Duration::from_secs(self.poster_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_build_default_hyperparameters() {
        let config = ServiceConfig::default();
        let hyper = config.hyperparameters();

        assert_eq!(hyper, Hyperparameters::default());
        assert_eq!(config.k, 15);
        assert_eq!(config.score_policy, ScorePolicy::ClampToBounds);
    }

    #[test]
    fn test_empty_environment_uses_defaults() {
        let vars: Vec<(String, String)> = Vec::new();
        let config: ServiceConfig = envy::prefixed("RECO_").from_iter(vars).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data/ml-100k"));
        assert_eq!(config.top_n, 10);
        assert!(config.tmdb_api_key.is_none());
    }

    #[test]
    fn test_prefixed_overrides() {
        let vars = vec![
            ("RECO_EPOCHS".to_string(), "12".to_string()),
            ("RECO_NEIGHBORHOOD_MODE".to_string(), "item".to_string()),
            ("RECO_SCORE_POLICY".to_string(), "raw".to_string()),
            ("RECO_MODEL_PATH".to_string(), "/tmp/model.json".to_string()),
        ];
        let config: ServiceConfig = envy::prefixed("RECO_").from_iter(vars).unwrap();

        assert_eq!(config.epochs, 12);
        assert_eq!(config.neighborhood_mode, Mode::Item);
        assert_eq!(config.score_policy, ScorePolicy::Raw);
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.json"));
    }
}
