//! Benchmarks for similarity computation and neighborhood prediction
//!
//! Run with: cargo bench --package similarity
//!
//! Uses a synthetic rating set shaped like MovieLens-100k (943 users, 1682 movies).

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use data_loader::{Rating, RatingCodec};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use similarity::{Mode, NeighborhoodPredictor, RatingMatrices, SimilarityModel, similarities};
use std::sync::Arc;

fn synthetic_ratings() -> Vec<Rating> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..100_000)
        .map(|_| {
            Rating::new(
                rng.random_range(1..=943),
                rng.random_range(1..=1682),
                rng.random_range(1..=5) as f32,
            )
        })
        .collect()
}

fn bench_user_similarity(c: &mut Criterion) {
    let ratings = synthetic_ratings();
    let codec = RatingCodec::fit(&ratings);
    let matrices = RatingMatrices::build(&ratings, &codec).expect("Failed to build matrices");

    c.bench_function("user_similarity", |b| {
        b.iter(|| black_box(similarities(black_box(&matrices.user_item))))
    });
}

fn bench_predict(c: &mut Criterion) {
    let ratings = synthetic_ratings();
    let model = Arc::new(SimilarityModel::build(&ratings).expect("Failed to build model"));

    for mode in [Mode::User, Mode::Item] {
        let predictor = NeighborhoodPredictor::new(Arc::clone(&model)).with_mode(mode);
        c.bench_function(&format!("predict_{}", mode), |b| {
            b.iter(|| black_box(predictor.predict(black_box(1), black_box(50))))
        });
    }
}

criterion_group!(benches, bench_user_similarity, bench_predict);
criterion_main!(benches);
