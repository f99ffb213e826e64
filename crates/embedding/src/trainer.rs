//! Training loop for the embedding model.
//!
//! Minibatch Adam on mean squared error, shuffling the ratings every epoch.
//! Cancellation is honored at epoch boundaries only; a cancelled or diverged
//! run returns an error and no artifact.

use crate::artifact::TrainedArtifact;
use crate::cancel::CancelToken;
use crate::error::{EmbeddingError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::mlp::MlpModel;
use crate::optimizer::Adam;
use data_loader::{Rating, RatingBounds, RatingCodec};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{info, instrument};

/// Per-epoch mean loss of a finished run
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub epoch_losses: Vec<f32>,
    pub n_ratings: usize,
}

impl TrainingReport {
    pub fn final_loss(&self) -> Option<f32> {
        self.epoch_losses.last().copied()
    }
}

/// Train a fresh model on `ratings` encoded with `codec`
#[instrument(skip_all, fields(ratings = ratings.len(), generation = codec.generation))]
pub fn train(
    ratings: &[Rating],
    codec: &RatingCodec,
    hyperparameters: &Hyperparameters,
    cancel: &CancelToken,
) -> Result<(TrainedArtifact, TrainingReport)> {
    hyperparameters.validate()?;
    if ratings.is_empty() {
        return Err(EmbeddingError::EmptyTrainingSet);
    }

    let mut rng = StdRng::seed_from_u64(hyperparameters.seed);
    let model = MlpModel::new(codec.users.len(), codec.movies.len(), hyperparameters, &mut rng);
    run(model, ratings, codec.clone(), hyperparameters.clone(), hyperparameters.epochs, rng, cancel)
}

/// Continue training `prior` after new ratings arrived.
///
/// The codec is extended with any new identifiers; their embedding rows are
/// freshly initialized and every existing row starts from the prior weights.
pub fn fine_tune(
    prior: &TrainedArtifact,
    ratings: &[Rating],
    epochs: usize,
    cancel: &CancelToken,
) -> Result<(TrainedArtifact, TrainingReport)> {
    let codec = prior.codec().extend(ratings);
    fine_tune_with_codec(prior, ratings, codec, epochs, cancel)
}

/// [`fine_tune`] against an explicit codec, which must extend the prior one
#[instrument(skip_all, fields(ratings = ratings.len(), prior = prior.generation(), generation = codec.generation))]
pub fn fine_tune_with_codec(
    prior: &TrainedArtifact,
    ratings: &[Rating],
    codec: RatingCodec,
    epochs: usize,
    cancel: &CancelToken,
) -> Result<(TrainedArtifact, TrainingReport)> {
    if !codec.extends(prior.codec()) {
        return Err(EmbeddingError::IncompatibleCodec(
            "new codec reorders or drops identifiers of the prior artifact".to_string(),
        ));
    }
    if epochs == 0 {
        return Err(EmbeddingError::InvalidHyperparameters(
            "epochs must be positive".to_string(),
        ));
    }
    if ratings.is_empty() {
        return Err(EmbeddingError::EmptyTrainingSet);
    }

    let hyperparameters = prior.hyperparameters().clone();
    let mut rng = StdRng::seed_from_u64(hyperparameters.seed.wrapping_add(codec.generation));
    let mut model = prior.model().clone();
    model.grow(codec.users.len(), codec.movies.len(), hyperparameters.init_scale, &mut rng);
    info!(
        "Fine-tuning from generation {}: {} -> {} users, {} -> {} movies",
        prior.generation(),
        prior.codec().users.len(),
        codec.users.len(),
        prior.codec().movies.len(),
        codec.movies.len()
    );
    run(model, ratings, codec, hyperparameters, epochs, rng, cancel)
}

fn run(
    mut model: MlpModel,
    ratings: &[Rating],
    codec: RatingCodec,
    hyperparameters: Hyperparameters,
    epochs: usize,
    mut rng: StdRng,
    cancel: &CancelToken,
) -> Result<(TrainedArtifact, TrainingReport)> {
    let mut examples = Vec::with_capacity(ratings.len());
    for rating in ratings {
        let (user, item) = codec.encode(rating)?;
        examples.push((user, item, rating.rating));
    }
    let bounds = RatingBounds::observed(ratings).unwrap_or_default();

    let mut optimizer = Adam::new(&model, hyperparameters.learning_rate);
    let mut report = TrainingReport {
        epoch_losses: Vec::with_capacity(epochs),
        n_ratings: examples.len(),
    };

    for epoch in 0..epochs {
        if cancel.is_cancelled() {
            info!("Training cancelled after {} epochs", epoch);
            return Err(EmbeddingError::Cancelled {
                completed_epochs: epoch,
            });
        }

        examples.shuffle(&mut rng);
        let mut total = 0.0f64;
        for batch in examples.chunks(hyperparameters.batch_size) {
            let users: Vec<usize> = batch.iter().map(|e| e.0).collect();
            let items: Vec<usize> = batch.iter().map(|e| e.1).collect();
            let targets: Vec<f32> = batch.iter().map(|e| e.2).collect();

            let pass = model.forward(&users, &items, Some(&mut rng));
            let (loss, grads) = model.backward(&pass, &users, &items, &targets);
            optimizer.apply(&mut model, &grads);
            total += loss as f64 * batch.len() as f64;
        }

        let mean_loss = (total / examples.len() as f64) as f32;
        if !mean_loss.is_finite() {
            return Err(EmbeddingError::Diverged {
                epoch: epoch + 1,
                loss: mean_loss,
            });
        }
        info!("Epoch {}/{} - loss: {:.4}", epoch + 1, epochs, mean_loss);
        report.epoch_losses.push(mean_loss);
    }

    Ok((TrainedArtifact::new(codec, bounds, hyperparameters, model), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hyperparameters::Activation;

    fn ratings() -> Vec<Rating> {
        let mut ratings = Vec::new();
        for user_id in 1..=6u32 {
            for movie_id in 1..=6u32 {
                let rating = if (user_id + movie_id) % 2 == 0 { 5.0 } else { 2.0 };
                ratings.push(Rating::new(user_id, movie_id, rating));
            }
        }
        ratings
    }

    fn hyper() -> Hyperparameters {
        Hyperparameters::new()
            .with_embedding_dim(8)
            .with_hidden_units(16, 8)
            .with_dropout(0.0)
            .with_learning_rate(0.01)
            .with_batch_size(8)
            .with_epochs(30)
    }

    #[test]
    fn test_training_reduces_loss() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let (artifact, report) = train(&ratings, &codec, &hyper(), &CancelToken::new()).unwrap();

        assert_eq!(report.epoch_losses.len(), 30);
        assert!(report.final_loss().unwrap() < report.epoch_losses[0]);
        assert_eq!(artifact.generation(), codec.generation);
        assert_eq!(artifact.bounds().min, 2.0);
        assert_eq!(artifact.bounds().max, 5.0);
    }

    #[test]
    fn test_training_is_deterministic_for_seed() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let hyper = hyper().with_epochs(2).with_dropout(0.2);
        let (a, _) = train(&ratings, &codec, &hyper, &CancelToken::new()).unwrap();
        let (b, _) = train(&ratings, &codec, &hyper, &CancelToken::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_ratings_fail_fast() {
        let codec = RatingCodec::fit(&[]);
        assert!(matches!(
            train(&[], &codec, &hyper(), &CancelToken::new()),
            Err(EmbeddingError::EmptyTrainingSet)
        ));
    }

    #[test]
    fn test_zero_epochs_fail_fast() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        assert!(matches!(
            train(&ratings, &codec, &hyper().with_epochs(0), &CancelToken::new()),
            Err(EmbeddingError::InvalidHyperparameters(_))
        ));

        let (prior, _) = train(&ratings, &codec, &hyper().with_epochs(1), &CancelToken::new()).unwrap();
        assert!(matches!(
            fine_tune(&prior, &ratings, 0, &CancelToken::new()),
            Err(EmbeddingError::InvalidHyperparameters(_))
        ));
    }

    #[test]
    fn test_unknown_identifier_rejected() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings[..3]);
        let err = train(&ratings, &codec, &hyper(), &CancelToken::new()).unwrap_err();
        assert!(err.is_unknown_identifier());
    }

    #[test]
    fn test_cancelled_before_first_epoch() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(matches!(
            train(&ratings, &codec, &hyper(), &cancel),
            Err(EmbeddingError::Cancelled { completed_epochs: 0 })
        ));
    }

    #[test]
    fn test_divergence_detected() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let hyper = hyper()
            .with_activation(Activation::Relu)
            .with_learning_rate(1e30)
            .with_batch_size(4)
            .with_epochs(5);

        assert!(matches!(
            train(&ratings, &codec, &hyper, &CancelToken::new()),
            Err(EmbeddingError::Diverged { .. })
        ));
    }

    #[test]
    fn test_fine_tune_grows_codec() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let hyper = hyper().with_epochs(2);
        let (prior, _) = train(&ratings, &codec, &hyper, &CancelToken::new()).unwrap();

        let mut more = ratings.clone();
        more.push(Rating::new(7, 1, 4.0));
        more.push(Rating::new(7, 9, 3.0));
        let (tuned, report) = fine_tune(&prior, &more, 2, &CancelToken::new()).unwrap();

        assert_eq!(report.epoch_losses.len(), 2);
        assert_eq!(tuned.generation(), prior.generation() + 1);
        assert!(tuned.codec().extends(prior.codec()));
        assert_eq!(tuned.model().n_users(), 7);
        assert_eq!(tuned.model().n_items(), 7);
        assert!(tuned.predict(7, 9, Default::default()).is_ok());
    }

    #[test]
    fn test_fine_tune_rejects_reordered_codec() {
        let ratings = ratings();
        let codec = RatingCodec::fit(&ratings);
        let (prior, _) = train(&ratings, &codec, &hyper().with_epochs(1), &CancelToken::new()).unwrap();

        // Refitting with a smaller id puts it first and shifts every index
        let mut more = ratings.clone();
        more.push(Rating::new(0, 1, 4.0));
        let refit = codec.refit(&more);

        assert!(matches!(
            fine_tune_with_codec(&prior, &more, refit, 1, &CancelToken::new()),
            Err(EmbeddingError::IncompatibleCodec(_))
        ));
    }
}
