//! Recommendation Ranker - top-N movies for one user
//!
//! ## Algorithm
//! 1. Candidates = every known movie, minus the ones the user rated
//! 2. Drop movies the artifact's codec cannot encode
//! 3. Score all remaining candidates in one batched forward pass
//! 4. Sort by predicted rating descending, ties by ascending movie id
//! 5. Keep the first `top_n`
//!
//! Unknown users and empty candidate sets yield an empty list, not an error.

use crate::filter_pipeline::FilterPipeline;
use crate::filters::{AlreadyRatedFilter, KnownItemFilter};
use crate::types::{Candidate, RankingContext, Recommendation};
use anyhow::Result;
use data_loader::{MovieId, UserId};
use embedding::{ScorePolicy, TrainedArtifact};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Rank unrated movies for `user_id` with a trained artifact
#[instrument(skip(artifact, rated_movie_ids, all_known_movie_ids), fields(generation = artifact.generation()))]
pub fn recommend(
    artifact: &Arc<TrainedArtifact>,
    user_id: UserId,
    rated_movie_ids: &HashSet<MovieId>,
    all_known_movie_ids: &[MovieId],
    top_n: usize,
    policy: ScorePolicy,
) -> Result<Vec<Recommendation>> {
    let Some(user_index) = artifact.codec().user_index(user_id) else {
        debug!("User {} is unknown to the artifact codec", user_id);
        return Ok(Vec::new());
    };
    if top_n == 0 {
        return Ok(Vec::new());
    }

    let context = RankingContext::new(user_id).with_rated(rated_movie_ids.iter().copied());
    let distinct: BTreeSet<MovieId> = all_known_movie_ids.iter().copied().collect();
    let candidates: Vec<Candidate> = distinct.into_iter().map(Candidate::new).collect();

    let pipeline = FilterPipeline::new()
        .add_filter(AlreadyRatedFilter)
        .add_filter(KnownItemFilter::new(Arc::clone(artifact)));
    let candidates = pipeline.apply(candidates, &context)?;
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let (movie_ids, item_indices): (Vec<MovieId>, Vec<usize>) = candidates
        .iter()
        .filter_map(|c| Some((c.movie_id, c.item_index?)))
        .unzip();
    let scores = artifact.score_items(user_index, &item_indices, policy)?;

    let mut ranked: Vec<Recommendation> = movie_ids
        .into_iter()
        .zip(scores)
        .filter(|(movie_id, score)| {
            let finite = score.is_finite();
            if !finite {
                warn!("Dropping non-finite score for movie {}", movie_id);
            }
            finite
        })
        .map(|(movie_id, predicted_rating)| Recommendation {
            movie_id,
            predicted_rating,
        })
        .collect();

    sort_recommendations(&mut ranked);
    ranked.truncate(top_n);
    debug!("Ranked {} recommendations for user {}", ranked.len(), user_id);
    Ok(ranked)
}

/// Descending predicted rating, ties broken by ascending movie id
pub fn sort_recommendations(recommendations: &mut [Recommendation]) {
    recommendations.sort_by(|a, b| {
        b.predicted_rating
            .total_cmp(&a.predicted_rating)
            .then(a.movie_id.cmp(&b.movie_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(movie_id: MovieId, predicted_rating: f32) -> Recommendation {
        Recommendation {
            movie_id,
            predicted_rating,
        }
    }

    #[test]
    fn test_sort_breaks_ties_by_movie_id() {
        let mut recs = vec![rec(9, 3.0), rec(4, 4.5), rec(2, 3.0), rec(7, 4.5)];
        sort_recommendations(&mut recs);

        let order: Vec<MovieId> = recs.iter().map(|r| r.movie_id).collect();
        assert_eq!(order, vec![4, 7, 2, 9]);
    }
}
