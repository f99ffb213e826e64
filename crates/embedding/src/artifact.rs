//! Persisted artifact: model weights travelling with the codec they index.
//!
//! The file is a single JSON document:
//! - `format_version`: checked before anything else is decoded
//! - `generation`, `codec`, `bounds`, `hyperparameters`
//! - `weights`: the [`MlpModel`]
//! - `checksum`: hex SHA-256 of the serialized weights
//!
//! A load either yields a fully validated artifact or an error; there is no
//! partially initialized state.

use crate::error::{EmbeddingError, Result};
use crate::hyperparameters::Hyperparameters;
use crate::mlp::MlpModel;
use data_loader::{MovieId, Rating, RatingBounds, RatingCodec, UserId};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Current on-disk format
pub const FORMAT_VERSION: u32 = 1;

/// How raw model outputs are turned into served scores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorePolicy {
    /// Serve the unbounded network output
    Raw,
    /// Clamp to the rating bounds observed at training time
    #[default]
    ClampToBounds,
}

impl ScorePolicy {
    pub fn apply(&self, score: f32, bounds: &RatingBounds) -> f32 {
        match self {
            ScorePolicy::Raw => score,
            ScorePolicy::ClampToBounds => bounds.clamp(score),
        }
    }
}

impl fmt::Display for ScorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScorePolicy::Raw => f.write_str("raw"),
            ScorePolicy::ClampToBounds => f.write_str("clamp"),
        }
    }
}

impl FromStr for ScorePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" => Ok(ScorePolicy::Raw),
            "clamp" | "clamp_to_bounds" => Ok(ScorePolicy::ClampToBounds),
            other => Err(format!("unknown score policy '{}'", other)),
        }
    }
}

/// A trained model together with the codec and bounds it was trained with
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedArtifact {
    pub(crate) codec: RatingCodec,
    pub(crate) bounds: RatingBounds,
    pub(crate) hyperparameters: Hyperparameters,
    pub(crate) model: MlpModel,
}

#[derive(Serialize)]
struct ArtifactFileRef<'a> {
    format_version: u32,
    generation: u64,
    codec: &'a RatingCodec,
    bounds: &'a RatingBounds,
    hyperparameters: &'a Hyperparameters,
    checksum: String,
    weights: &'a MlpModel,
}

#[derive(Deserialize)]
struct ArtifactFile {
    generation: u64,
    codec: RatingCodec,
    bounds: RatingBounds,
    hyperparameters: Hyperparameters,
    checksum: String,
    weights: MlpModel,
}

#[derive(Deserialize)]
struct VersionHeader {
    format_version: u32,
}

fn weights_checksum(model: &MlpModel) -> Result<String> {
    let bytes = serde_json::to_vec(model)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

impl TrainedArtifact {
    pub(crate) fn new(
        codec: RatingCodec,
        bounds: RatingBounds,
        hyperparameters: Hyperparameters,
        model: MlpModel,
    ) -> Self {
        Self {
            codec,
            bounds,
            hyperparameters,
            model,
        }
    }

    /// Codec generation the weights were trained against
    pub fn generation(&self) -> u64 {
        self.codec.generation
    }

    pub fn codec(&self) -> &RatingCodec {
        &self.codec
    }

    pub fn bounds(&self) -> &RatingBounds {
        &self.bounds
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    pub fn model(&self) -> &MlpModel {
        &self.model
    }

    /// Score one raw `(user_id, movie_id)` pair.
    ///
    /// Fails with `UnknownIdentifier` when either id is outside the codec.
    pub fn predict(&self, user_id: UserId, movie_id: MovieId, policy: ScorePolicy) -> Result<f32> {
        let user = self.codec.users.encode(user_id)?;
        let item = self.codec.movies.encode(movie_id)?;
        let score = self.model.predict(user, item)?;
        Ok(policy.apply(score, &self.bounds))
    }

    /// Score many movies for one already-encoded user in a single pass
    pub fn score_items(&self, user_index: usize, item_indices: &[usize], policy: ScorePolicy) -> Result<Vec<f32>> {
        let users = vec![user_index; item_indices.len()];
        let scores = self.model.predict_batch(&users, item_indices)?;
        Ok(scores
            .into_iter()
            .map(|score| policy.apply(score, &self.bounds))
            .collect())
    }

    /// Fail with `IncompatibleCodec` if any rating is outside this artifact's codec
    pub fn check_compatible(&self, ratings: &[Rating]) -> Result<()> {
        self.codec.check_covers(ratings).map_err(|e| {
            EmbeddingError::IncompatibleCodec(format!(
                "artifact generation {} cannot address current ratings: {}",
                self.generation(),
                e
            ))
        })
    }

    /// Write the artifact to `path`, replacing any previous file atomically
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = ArtifactFileRef {
            format_version: FORMAT_VERSION,
            generation: self.generation(),
            codec: &self.codec,
            bounds: &self.bounds,
            hyperparameters: &self.hyperparameters,
            checksum: weights_checksum(&self.model)?,
            weights: &self.model,
        };
        let bytes = serde_json::to_vec(&file)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = tmp_sibling(path);
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, path)?;

        info!(
            "Saved artifact generation {} ({} bytes) to {:?}",
            self.generation(),
            bytes.len(),
            path
        );
        Ok(())
    }

    /// Read and validate an artifact written by [`save`](Self::save)
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let artifact = Self::from_slice(&bytes)?;
        debug!("Loaded artifact generation {} from {:?}", artifact.generation(), path);
        Ok(artifact)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let corrupt = |reason: String| EmbeddingError::CorruptArtifact(reason);

        let header: VersionHeader =
            serde_json::from_slice(bytes).map_err(|e| corrupt(format!("unreadable header: {}", e)))?;
        if header.format_version != FORMAT_VERSION {
            return Err(EmbeddingError::UnsupportedVersion {
                found: header.format_version,
                expected: FORMAT_VERSION,
            });
        }

        let file: ArtifactFile =
            serde_json::from_slice(bytes).map_err(|e| corrupt(format!("undecodable body: {}", e)))?;

        if weights_checksum(&file.weights)? != file.checksum {
            return Err(corrupt("weights checksum mismatch".to_string()));
        }
        if file.generation != file.codec.generation {
            return Err(corrupt(format!(
                "generation {} does not match codec generation {}",
                file.generation, file.codec.generation
            )));
        }
        file.weights.check_shapes().map_err(corrupt)?;
        if file.weights.n_users() != file.codec.users.len()
            || file.weights.n_items() != file.codec.movies.len()
        {
            return Err(corrupt(format!(
                "embedding tables {}x{} do not match codec {}x{}",
                file.weights.n_users(),
                file.weights.n_items(),
                file.codec.users.len(),
                file.codec.movies.len()
            )));
        }
        if file.weights.embedding_dim() != file.hyperparameters.embedding_dim {
            return Err(corrupt("embedding width does not match hyperparameters".to_string()));
        }

        Ok(Self::new(file.codec, file.bounds, file.hyperparameters, file.weights))
    }
}
