//! Filter matching candidates against the artifact's movie codec.

use crate::traits::Filter;
use crate::types::{Candidate, RankingContext};
use anyhow::Result;
use embedding::TrainedArtifact;
use std::sync::Arc;
use tracing::debug;

/// Fills in each candidate's item index and drops movies the codec cannot
/// encode. Unknown movies are skipped, never an error.
pub struct KnownItemFilter {
    artifact: Arc<TrainedArtifact>,
}

impl KnownItemFilter {
    pub fn new(artifact: Arc<TrainedArtifact>) -> Self {
        Self { artifact }
    }
}

impl Filter for KnownItemFilter {
    fn name(&self) -> &str {
        "KnownItemFilter"
    }

    fn apply(&self, candidates: Vec<Candidate>, _context: &RankingContext) -> Result<Vec<Candidate>> {
        let before = candidates.len();
        let movies = &self.artifact.codec().movies;
        let known: Vec<Candidate> = candidates
            .into_iter()
            .filter_map(|mut candidate| {
                candidate.item_index = Some(movies.get(candidate.movie_id)?);
                Some(candidate)
            })
            .collect();
        if known.len() < before {
            debug!("Dropped {} movies unknown to the codec", before - known.len());
        }
        Ok(known)
    }
}
