//! Train/held-out splitting for evaluation.
//!
//! The split is stratified by user: each user contributes roughly the same
//! fraction of their ratings to the held-out set, so every held-out user also
//! appears in training.

use crate::types::{Rating, UserId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Ratings divided into a training part and a held-out part
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Vec<Rating>,
    pub test: Vec<Rating>,
}

/// Split `ratings` per user, deterministic for a given `seed`.
///
/// For a user with `n` ratings, `round(n * test_fraction)` of them are held
/// out, capped at `n - 1` so the user keeps at least one training rating.
pub fn stratified_split(ratings: &[Rating], test_fraction: f32, seed: u64) -> Split {
    let fraction = test_fraction.clamp(0.0, 1.0);
    let mut by_user: BTreeMap<UserId, Vec<Rating>> = BTreeMap::new();
    for &rating in ratings {
        by_user.entry(rating.user_id).or_default().push(rating);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(ratings.len());
    let mut test = Vec::new();

    for (_, mut user_ratings) in by_user {
        user_ratings.sort_by_key(|r| r.movie_id);
        user_ratings.shuffle(&mut rng);

        let n = user_ratings.len();
        let held_out = ((n as f32 * fraction).round() as usize).min(n.saturating_sub(1));
        let kept = user_ratings.split_off(held_out);
        test.extend(user_ratings);
        train.extend(kept);
    }

    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ratings() -> Vec<Rating> {
        let mut ratings = Vec::new();
        for user_id in 1..=4 {
            for movie_id in 1..=10 {
                ratings.push(Rating::new(user_id, movie_id, ((movie_id % 5) + 1) as f32));
            }
        }
        ratings.push(Rating::new(99, 1, 3.0));
        ratings
    }

    #[test]
    fn test_split_is_stratified() {
        let split = stratified_split(&ratings(), 0.2, 42);

        assert_eq!(split.train.len() + split.test.len(), 41);
        for user_id in 1..=4 {
            let held = split.test.iter().filter(|r| r.user_id == user_id).count();
            assert_eq!(held, 2);
        }
        // A single-rating user stays entirely in training
        assert!(split.test.iter().all(|r| r.user_id != 99));
        assert!(split.train.iter().any(|r| r.user_id == 99));
    }

    #[test]
    fn test_split_is_deterministic() {
        let a = stratified_split(&ratings(), 0.2, 7);
        let b = stratified_split(&ratings(), 0.2, 7);
        assert_eq!(a.test, b.test);
        assert_eq!(a.train, b.train);
    }
}
