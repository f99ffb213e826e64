//! Integration tests for ranking and evaluation.
//!
//! These tests train small models on a synthetic rating set and check the
//! ranker's contract and the harness against both model families.

use data_loader::{DataIndex, MovieId, Rating, RatingCodec, stratified_split};
use embedding::{CancelToken, Hyperparameters, ScorePolicy, TrainedArtifact, train};
use pipeline::{ArtifactPredictor, evaluate, recommend};
use similarity::{Mode, NeighborhoodPredictor, SimilarityModel};
use std::collections::HashSet;
use std::sync::Arc;

fn ratings() -> Vec<Rating> {
    let mut ratings = Vec::new();
    for user_id in 1..=8u32 {
        for movie_id in 1..=12u32 {
            if (user_id + 2 * movie_id) % 4 != 0 {
                let rating = ((user_id * 3 + movie_id) % 5 + 1) as f32;
                ratings.push(Rating::new(user_id, movie_id, rating));
            }
        }
    }
    ratings
}

fn trained(ratings: &[Rating]) -> Arc<TrainedArtifact> {
    let codec = RatingCodec::fit(ratings);
    let hyper = Hyperparameters::new()
        .with_embedding_dim(8)
        .with_hidden_units(16, 8)
        .with_epochs(3)
        .with_batch_size(16);
    let (artifact, _) = train(ratings, &codec, &hyper, &CancelToken::new()).unwrap();
    Arc::new(artifact)
}

#[test]
fn test_recommend_excludes_rated_and_respects_top_n() {
    let ratings = ratings();
    let artifact = trained(&ratings);
    let index = DataIndex::from_parts(Vec::new(), &ratings).unwrap();

    // User 2 rated only the even-numbered movies
    let rated: HashSet<MovieId> = index.get_user_ratings(2).iter().map(|r| r.movie_id).collect();
    assert_eq!(rated.len(), 6);
    let recs = recommend(&artifact, 2, &rated, &index.all_movie_ids(), 3, ScorePolicy::ClampToBounds).unwrap();

    assert!(!recs.is_empty());
    assert!(recs.len() <= 3);
    for rec in &recs {
        assert!(!rated.contains(&rec.movie_id));
        assert!((1.0..=5.0).contains(&rec.predicted_rating));
    }
    for pair in recs.windows(2) {
        assert!(
            pair[0].predicted_rating > pair[1].predicted_rating
                || (pair[0].predicted_rating == pair[1].predicted_rating
                    && pair[0].movie_id < pair[1].movie_id)
        );
    }
}

#[test]
fn test_recommend_skips_unknown_movies_and_users() {
    let ratings = ratings();
    let artifact = trained(&ratings);
    let none = HashSet::new();

    let recs = recommend(&artifact, 2, &none, &[1, 2, 500, 501], 10, ScorePolicy::Raw).unwrap();
    let ids: Vec<MovieId> = recs.iter().map(|r| r.movie_id).collect();
    assert_eq!(ids.len(), 2);
    assert!(!ids.contains(&500));

    assert!(recommend(&artifact, 999, &none, &[1, 2], 10, ScorePolicy::Raw).unwrap().is_empty());

    let all: HashSet<MovieId> = (1..=12).collect();
    let every: Vec<MovieId> = (1..=12).collect();
    assert!(recommend(&artifact, 2, &all, &every, 10, ScorePolicy::Raw).unwrap().is_empty());
}

#[test]
fn test_recommend_is_stable_across_save_and_load() {
    let ratings = ratings();
    let artifact = trained(&ratings);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mlp.json");
    artifact.save(&path).unwrap();
    let loaded = Arc::new(TrainedArtifact::load(&path).unwrap());

    let rated: HashSet<MovieId> = [1, 2].into_iter().collect();
    let every: Vec<MovieId> = (1..=12).collect();
    let before = recommend(&artifact, 3, &rated, &every, 5, ScorePolicy::ClampToBounds).unwrap();
    let after = recommend(&loaded, 3, &rated, &every, 5, ScorePolicy::ClampToBounds).unwrap();
    assert_eq!(before, after);
}

#[test]
fn test_both_model_families_evaluate() {
    let split = stratified_split(&ratings(), 0.2, 42);
    assert!(!split.test.is_empty());

    let artifact = trained(&split.train);
    let embedding_metrics = evaluate(&ArtifactPredictor::new(artifact), &split.test);

    let model = Arc::new(SimilarityModel::build(&split.train).unwrap());
    let knn = NeighborhoodPredictor::new(model).with_k(3).with_mode(Mode::Item);
    let knn_metrics = evaluate(&knn, &split.test);

    for metrics in [embedding_metrics, knn_metrics] {
        assert_eq!(metrics.n + metrics.skipped, split.test.len());
        if metrics.n > 0 {
            assert!(metrics.rmse.unwrap() >= metrics.mae.unwrap());
        }
    }
}
