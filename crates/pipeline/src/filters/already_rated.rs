//! Filter to remove movies the user has already rated.
//!
//! This is the first filter in the ranking pipeline: a rated movie is
//! never recommended back.

use crate::traits::Filter;
use crate::types::{Candidate, RankingContext};
use anyhow::Result;

/// Removes candidates found in `RankingContext::rated_movies`
pub struct AlreadyRatedFilter;

impl Filter for AlreadyRatedFilter {
    fn name(&self) -> &str {
        "AlreadyRatedFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, context: &RankingContext) -> Result<Vec<Candidate>> {
        let filtered: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| !context.rated_movies.contains(&candidate.movie_id))
            .collect();
        Ok(filtered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_rated_filter() {
        let context = RankingContext::new(1).with_rated([100, 200]);

        let candidates = vec![
            Candidate::new(100),
            Candidate::new(101),
            Candidate::new(200),
            Candidate::new(300),
        ];

        let filtered = AlreadyRatedFilter.apply(candidates, &context).unwrap();

        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].movie_id, 101);
        assert_eq!(filtered[1].movie_id, 300);
    }
}
