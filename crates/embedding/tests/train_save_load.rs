//! Train -> save -> load against a rating store, checking artifact compatibility

use data_loader::{MemoryOverlay, Rating, RatingCodec, RatingStore};
use embedding::{CancelToken, EmbeddingError, Hyperparameters, ScorePolicy, TrainedArtifact, train};

fn store() -> RatingStore<MemoryOverlay> {
    let mut base = Vec::new();
    for user_id in 1..=5u32 {
        for movie_id in 1..=8u32 {
            if (user_id * movie_id) % 3 != 1 {
                base.push(Rating::new(user_id, movie_id, ((user_id + movie_id) % 5 + 1) as f32));
            }
        }
    }
    RatingStore::new(base, MemoryOverlay::new())
}

fn hyper() -> Hyperparameters {
    Hyperparameters::new()
        .with_embedding_dim(6)
        .with_hidden_units(12, 6)
        .with_epochs(3)
        .with_batch_size(16)
}

#[test]
fn test_loaded_artifact_scores_identically() {
    let store = store();
    let ratings = store.load().unwrap();
    let codec = RatingCodec::fit(&ratings);
    let (artifact, _) = train(&ratings, &codec, &hyper(), &CancelToken::new()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mlp.json");
    artifact.save(&path).unwrap();
    let loaded = TrainedArtifact::load(&path).unwrap();
    loaded.check_compatible(&store.load().unwrap()).unwrap();

    for movie_id in 1..=8 {
        for policy in [ScorePolicy::Raw, ScorePolicy::ClampToBounds] {
            assert_eq!(
                loaded.predict(2, movie_id, policy).unwrap(),
                artifact.predict(2, movie_id, policy).unwrap()
            );
        }
    }
}

#[test]
fn test_new_user_makes_artifact_incompatible() {
    let store = store();
    let ratings = store.load().unwrap();
    let codec = RatingCodec::fit(&ratings);
    let (artifact, _) = train(&ratings, &codec, &hyper(), &CancelToken::new()).unwrap();

    store.append(Rating::new(50, 3, 4.0)).unwrap();
    let err = artifact.check_compatible(&store.load().unwrap()).unwrap_err();
    assert!(matches!(err, EmbeddingError::IncompatibleCodec(_)));
}

#[test]
fn test_missing_artifact_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = TrainedArtifact::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, EmbeddingError::Io(_)));
}
