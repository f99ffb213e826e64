//! Recommendation Service - coordinates storage, training and ranking
//!
//! This is the surface the CLI talks to:
//! 1. `ingest` appends ratings to the store and marks the served model stale
//! 2. `train_and_save` retrains on the current ratings in a blocking task,
//!    writes the artifact, then swaps it in
//! 3. `recommend` ranks unrated movies with whichever artifact is served;
//!    it never retrains (`refresh_recommendations` does both)
//!
//! ## Concurrency
//! At most one training run is in flight: every run holds an async mutex for
//! its whole duration. The served model is an `Arc<TrainedArtifact>`, weights
//! and codec together, replaced under a lock, so a reader sees one whole
//! generation or the next one and never a mix of the two.

use crate::config::ServiceConfig;
use crate::error::{Result, ServiceError};
use crate::posters::PosterCache;
use data_loader::{
    CsvOverlay, DataIndex, Movie, MovieId, MovieStats, OverlayRecord, OverlayStore, Rating,
    RatingCodec, RatingStore, UserId, parser, stratified_split,
};
use embedding::{CancelToken, TrainedArtifact, TrainingReport};
use pipeline::{ArtifactPredictor, EvaluationMetrics, Recommendation};
use serde::Serialize;
use similarity::{Mode, NeighborhoodPredictor, Prediction, SimilarityModel};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Real ratings a new user must give before they are ingested
pub const MIN_SEED_RATINGS: usize = 5;

type Store = RatingStore<Box<dyn OverlayStore>>;

/// A recommendation joined with catalog details
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieRecommendation {
    pub movie_id: MovieId,
    pub title: String,
    pub year: Option<u16>,
    pub predicted_rating: f32,
}

/// A movie offered to a new user for a seed rating
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeedMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub stats: MovieStats,
}

/// One of the user's own ratings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatedMovie {
    pub movie_id: MovieId,
    pub title: String,
    pub rating: f32,
}

/// Result of a completed training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: Arc<TrainedArtifact>,
    pub report: TrainingReport,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ServiceStatus {
    /// Codec generation of the served artifact
    pub generation: Option<u64>,
    /// Ratings were ingested after the served artifact was trained
    pub stale: bool,
    pub n_ratings: usize,
    pub n_users: usize,
    pub n_movies: usize,
}

#[derive(Debug)]
struct Served {
    artifact: Arc<TrainedArtifact>,
    stale: bool,
}

fn read<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| ServiceError::LockPoisoned(name))
}

fn write<'a, T>(lock: &'a RwLock<T>, name: &'static str) -> Result<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| ServiceError::LockPoisoned(name))
}

/// Owns the rating store and the served artifact
pub struct RecommendationService {
    config: ServiceConfig,
    store: Mutex<Store>,
    movies: Vec<Movie>,
    catalog: RwLock<Option<Arc<DataIndex>>>,
    similarity: RwLock<Option<Arc<SimilarityModel>>>,
    served: RwLock<Option<Served>>,
    /// Bumped by every ingest; caches built before a bump are discarded
    ingests: AtomicU64,
    training: tokio::sync::Mutex<()>,
    posters: Option<Arc<PosterCache>>,
}

impl RecommendationService {
    /// Open the dataset and CSV overlay named by `config`
    pub fn open(config: ServiceConfig) -> Result<Self> {
        let overlay: Box<dyn OverlayStore> = Box::new(CsvOverlay::new(config.overlay_path.clone()));
        let store = RatingStore::open(&config.data_dir, overlay)?;
        let movies = parser::parse_movies(&config.data_dir.join("u.item"))?;
        info!("Opened service over {} movies", movies.len());
        Ok(Self::new(config, store, movies))
    }

    pub fn new(config: ServiceConfig, store: Store, movies: Vec<Movie>) -> Self {
        Self {
            config,
            store: Mutex::new(store),
            movies,
            catalog: RwLock::new(None),
            similarity: RwLock::new(None),
            served: RwLock::new(None),
            ingests: AtomicU64::new(0),
            training: tokio::sync::Mutex::new(()),
            posters: None,
        }
    }

    pub fn with_posters(mut self, posters: PosterCache) -> Self {
        self.posters = Some(Arc::new(posters));
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Store>> {
        self.store
            .lock()
            .map_err(|_| ServiceError::LockPoisoned("rating store"))
    }

    /// Base ratings merged with the overlay
    pub fn ratings(&self) -> Result<Vec<Rating>> {
        Ok(self.lock_store()?.load()?)
    }

    // =========================================================================
    // Ingest
    // =========================================================================

    /// Append one rating and invalidate everything built on the old ratings
    pub fn ingest(&self, rating: Rating) -> Result<OverlayRecord> {
        let record = self.lock_store()?.append(rating)?;
        self.invalidate()?;
        info!(
            "Ingested rating {} for user {} movie {}",
            rating.rating, rating.user_id, rating.movie_id
        );
        Ok(record)
    }

    pub fn ingest_many(&self, ratings: &[Rating]) -> Result<Vec<OverlayRecord>> {
        if ratings.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.lock_store()?.append_many(ratings)?;
        self.invalidate()?;
        info!("Ingested {} ratings", ratings.len());
        Ok(records)
    }

    /// Ingest a new user's first ratings.
    ///
    /// Zero means "not seen" and is dropped; at least [`MIN_SEED_RATINGS`]
    /// real ratings must remain or nothing is written.
    pub fn submit_seed_ratings(&self, user_id: UserId, ratings: &[(MovieId, f32)]) -> Result<usize> {
        let real: Vec<Rating> = ratings
            .iter()
            .filter(|(_, rating)| *rating > 0.0)
            .map(|&(movie_id, rating)| Rating::new(user_id, movie_id, rating))
            .collect();
        if real.len() < MIN_SEED_RATINGS {
            return Err(ServiceError::NotEnoughRatings {
                got: real.len(),
                required: MIN_SEED_RATINGS,
            });
        }
        self.ingest_many(&real)?;
        Ok(real.len())
    }

    fn invalidate(&self) -> Result<()> {
        self.ingests.fetch_add(1, Ordering::SeqCst);
        *write(&self.catalog, "catalog")? = None;
        *write(&self.similarity, "similarity model")? = None;
        if let Some(served) = write(&self.served, "served artifact")?.as_mut() {
            if !served.stale {
                info!("Artifact generation {} is now stale", served.artifact.generation());
            }
            served.stale = true;
        }
        Ok(())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    fn catalog(&self) -> Result<Arc<DataIndex>> {
        if let Some(catalog) = read(&self.catalog, "catalog")?.as_ref() {
            return Ok(Arc::clone(catalog));
        }
        let seen = self.ingests.load(Ordering::SeqCst);
        let ratings = self.ratings()?;
        let catalog = Arc::new(DataIndex::from_parts(self.movies.clone(), &ratings)?);
        if self.ingests.load(Ordering::SeqCst) == seen {
            *write(&self.catalog, "catalog")? = Some(Arc::clone(&catalog));
        }
        Ok(catalog)
    }

    /// Largest user id present in the ratings
    pub fn max_user_id(&self) -> Result<UserId> {
        Ok(self.catalog()?.max_user_id().unwrap_or(0))
    }

    /// The `n` most rated movies, offered to new users for seed ratings
    pub fn seed_movies(&self, n: usize) -> Result<Vec<SeedMovie>> {
        let catalog = self.catalog()?;
        Ok(catalog
            .most_rated_movies(n)
            .into_iter()
            .filter_map(|id| {
                let stats = *catalog.get_movie_stats(id)?;
                Some(SeedMovie {
                    movie_id: id,
                    title: catalog.title_of(id),
                    stats,
                })
            })
            .collect())
    }

    /// The user's own ratings with titles, by ascending movie id
    pub fn rated_movies(&self, user_id: UserId) -> Result<Vec<RatedMovie>> {
        let catalog = self.catalog()?;
        let mut rated: Vec<RatedMovie> = catalog
            .get_user_ratings(user_id)
            .iter()
            .map(|r| RatedMovie {
                movie_id: r.movie_id,
                title: catalog.title_of(r.movie_id),
                rating: r.rating,
            })
            .collect();
        rated.sort_by_key(|r| r.movie_id);
        Ok(rated)
    }

    pub fn status(&self) -> Result<ServiceStatus> {
        let catalog = self.catalog()?;
        let (n_movies, n_users, n_ratings) = catalog.counts();
        let served = read(&self.served, "served artifact")?;
        Ok(ServiceStatus {
            generation: served.as_ref().map(|s| s.artifact.generation()),
            stale: served.as_ref().is_some_and(|s| s.stale),
            n_ratings,
            n_users,
            n_movies,
        })
    }

    // =========================================================================
    // Training and persistence
    // =========================================================================

    /// The served artifact, if any
    pub fn current_artifact(&self) -> Result<Option<Arc<TrainedArtifact>>> {
        Ok(read(&self.served, "served artifact")?
            .as_ref()
            .map(|s| Arc::clone(&s.artifact)))
    }

    fn publish(&self, artifact: Arc<TrainedArtifact>, ingests_seen: u64) -> Result<()> {
        let stale = self.ingests.load(Ordering::SeqCst) != ingests_seen;
        info!(
            "Serving artifact generation {}{}",
            artifact.generation(),
            if stale { " (ratings changed during training)" } else { "" }
        );
        *write(&self.served, "served artifact")? = Some(Served { artifact, stale });
        Ok(())
    }

    /// Retrain from scratch on the current ratings, save to `path`, serve it.
    ///
    /// A cancelled or failed run leaves both the file and the served
    /// artifact untouched.
    #[instrument(skip(self, cancel))]
    pub async fn train_and_save(&self, path: &Path, cancel: &CancelToken) -> Result<TrainingOutcome> {
        let _training = self.training.lock().await;
        let start = Instant::now();

        let seen = self.ingests.load(Ordering::SeqCst);
        let ratings = self.ratings()?;
        let codec = match self.current_artifact()? {
            Some(prior) => prior.codec().refit(&ratings),
            None => RatingCodec::fit(&ratings),
        };
        let hyperparameters = self.config.hyperparameters();
        info!(
            "Training generation {} on {} ratings",
            codec.generation,
            ratings.len()
        );

        let task_path = path.to_path_buf();
        let cancel = cancel.clone();
        let (artifact, report) = tokio::task::spawn_blocking(move || -> Result<_> {
            let (artifact, report) = embedding::train(&ratings, &codec, &hyperparameters, &cancel)?;
            artifact.save(&task_path)?;
            Ok((artifact, report))
        })
        .await??;

        let artifact = Arc::new(artifact);
        self.publish(Arc::clone(&artifact), seen)?;
        info!("Training and save completed in {:?}", start.elapsed());

        Ok(TrainingOutcome {
            artifact,
            report,
            path: path.to_path_buf(),
        })
    }

    /// Continue training the served artifact on the current ratings
    #[instrument(skip(self, cancel))]
    pub async fn fine_tune_and_save(
        &self,
        path: &Path,
        epochs: usize,
        cancel: &CancelToken,
    ) -> Result<TrainingOutcome> {
        let _training = self.training.lock().await;
        let start = Instant::now();

        let prior = self.current_artifact()?.ok_or(ServiceError::NoArtifact)?;
        let seen = self.ingests.load(Ordering::SeqCst);
        let ratings = self.ratings()?;

        let task_path = path.to_path_buf();
        let cancel = cancel.clone();
        let (artifact, report) = tokio::task::spawn_blocking(move || -> Result<_> {
            let (artifact, report) = embedding::fine_tune(&prior, &ratings, epochs, &cancel)?;
            artifact.save(&task_path)?;
            Ok((artifact, report))
        })
        .await??;

        let artifact = Arc::new(artifact);
        self.publish(Arc::clone(&artifact), seen)?;
        info!("Fine-tuning and save completed in {:?}", start.elapsed());

        Ok(TrainingOutcome {
            artifact,
            report,
            path: path.to_path_buf(),
        })
    }

    /// Read an artifact and serve it if its codec covers the current ratings
    pub fn load(&self, path: &Path) -> Result<Arc<TrainedArtifact>> {
        let seen = self.ingests.load(Ordering::SeqCst);
        let artifact = TrainedArtifact::load(path)?;
        artifact.check_compatible(&self.ratings()?)?;

        let artifact = Arc::new(artifact);
        self.publish(Arc::clone(&artifact), seen)?;
        Ok(artifact)
    }

    /// [`load`](Self::load) the configured model path when it exists
    pub fn load_if_present(&self) -> Result<Option<Arc<TrainedArtifact>>> {
        let path = self.config.model_path.clone();
        if !path.exists() {
            return Ok(None);
        }
        self.load(&path).map(Some)
    }

    // =========================================================================
    // Ranking
    // =========================================================================

    /// Top-N unrated movies for `user_id` from the served artifact
    pub fn recommend(&self, user_id: UserId, top_n: usize) -> Result<Vec<MovieRecommendation>> {
        let artifact = {
            let served = read(&self.served, "served artifact")?;
            let served = served.as_ref().ok_or(ServiceError::NoArtifact)?;
            if served.stale {
                warn!(
                    "Serving stale artifact generation {}; retrain to include new ratings",
                    served.artifact.generation()
                );
            }
            Arc::clone(&served.artifact)
        };
        self.recommend_with(&artifact, user_id, top_n)
    }

    /// Top-N unrated movies for `user_id` from a specific artifact
    pub fn recommend_with(
        &self,
        artifact: &Arc<TrainedArtifact>,
        user_id: UserId,
        top_n: usize,
    ) -> Result<Vec<MovieRecommendation>> {
        let catalog = self.catalog()?;
        let rated: HashSet<MovieId> = catalog
            .get_user_ratings(user_id)
            .iter()
            .map(|r| r.movie_id)
            .collect();
        let all_known = catalog.all_movie_ids();

        let ranked = pipeline::recommend(
            artifact,
            user_id,
            &rated,
            &all_known,
            top_n,
            self.config.score_policy,
        )?;
        Ok(ranked
            .into_iter()
            .map(|r| describe(&catalog, r))
            .collect())
    }

    /// Retrain, save to the configured model path, then recommend
    pub async fn refresh_recommendations(
        &self,
        user_id: UserId,
        top_n: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<MovieRecommendation>> {
        let path = self.config.model_path.clone();
        self.train_and_save(&path, cancel).await?;
        self.recommend(user_id, top_n)
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    /// Score `held_out` with the served artifact
    pub fn evaluate(&self, held_out: &[Rating]) -> Result<EvaluationMetrics> {
        let artifact = self.current_artifact()?.ok_or(ServiceError::NoArtifact)?;
        let predictor = ArtifactPredictor::new(artifact).with_policy(self.config.score_policy);
        Ok(pipeline::evaluate(&predictor, held_out))
    }

    /// Train a throwaway model on a per-user split and score the held-out part.
    ///
    /// The codec is fitted on the training part only, so held-out ratings of
    /// identifiers training never saw count as skipped. Runs under the training lock but never replaces the served artifact.
    #[instrument(skip(self, cancel))]
    pub async fn evaluate_holdout(
        &self,
        test_fraction: f32,
        seed: u64,
        cancel: &CancelToken,
    ) -> Result<(EvaluationMetrics, TrainingReport)> {
        let _training = self.training.lock().await;
        let ratings = self.ratings()?;
        let hyperparameters = self.config.hyperparameters();
        let policy = self.config.score_policy;
        let cancel = cancel.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<_> {
            let split = stratified_split(&ratings, test_fraction, seed);
            let codec = RatingCodec::fit(&split.train);
            let (artifact, report) = embedding::train(&split.train, &codec, &hyperparameters, &cancel)?;
            let predictor = ArtifactPredictor::new(Arc::new(artifact)).with_policy(policy);
            Ok((pipeline::evaluate(&predictor, &split.test), report))
        })
        .await??;
        Ok(result)
    }

    /// Score the similarity baseline on a per-user split.
    ///
    /// Held-out pairs whose movie only appears in the held-out part are skipped.
    #[instrument(skip(self))]
    pub async fn evaluate_neighborhood(
        &self,
        k: usize,
        mode: Mode,
        test_fraction: f32,
        seed: u64,
    ) -> Result<EvaluationMetrics> {
        let ratings = self.ratings()?;
        let metrics = tokio::task::spawn_blocking(move || -> Result<_> {
            let split = stratified_split(&ratings, test_fraction, seed);
            let model = SimilarityModel::build(&split.train)?;
            let predictor = NeighborhoodPredictor::new(Arc::new(model))
                .with_k(k)
                .with_mode(mode);
            Ok(pipeline::evaluate(&predictor, &split.test))
        })
        .await??;
        Ok(metrics)
    }

    /// Similarity model over all current ratings, built once per ingest
    pub async fn similarity_model(&self) -> Result<Arc<SimilarityModel>> {
        if let Some(model) = read(&self.similarity, "similarity model")?.as_ref() {
            return Ok(Arc::clone(model));
        }
        let seen = self.ingests.load(Ordering::SeqCst);
        let ratings = self.ratings()?;
        let model = tokio::task::spawn_blocking(move || SimilarityModel::build(&ratings)).await??;
        let model = Arc::new(model);
        if self.ingests.load(Ordering::SeqCst) == seen {
            *write(&self.similarity, "similarity model")? = Some(Arc::clone(&model));
        }
        Ok(model)
    }

    /// Neighborhood prediction with the configured `k` and mode
    pub async fn predict_neighborhood(&self, user_id: UserId, movie_id: MovieId) -> Result<Prediction> {
        let model = self.similarity_model().await?;
        Ok(NeighborhoodPredictor::new(model)
            .with_k(self.config.k)
            .with_mode(self.config.neighborhood_mode)
            .predict(user_id, movie_id))
    }

    // =========================================================================
    // Posters
    // =========================================================================

    /// Best-effort poster URL; `None` when lookups are disabled or fail
    pub async fn poster_url(&self, title: &str) -> Result<Option<String>> {
        let Some(posters) = self.posters.clone() else {
            return Ok(None);
        };
        let title = title.to_string();
        Ok(tokio::task::spawn_blocking(move || posters.poster_url(&title)).await?)
    }
}

fn describe(catalog: &DataIndex, recommendation: Recommendation) -> MovieRecommendation {
    MovieRecommendation {
        movie_id: recommendation.movie_id,
        title: catalog.title_of(recommendation.movie_id),
        year: catalog
            .get_movie(recommendation.movie_id)
            .and_then(|movie| movie.year),
        predicted_rating: recommendation.predicted_rating,
    }
}
