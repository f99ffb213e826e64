//! Error types for the embedding crate.

use data_loader::DataLoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// A rating or lookup referenced an identifier outside the codec
    #[error(transparent)]
    Data(#[from] DataLoadError),

    /// Training was asked to fit zero ratings
    #[error("Cannot train on an empty rating set")]
    EmptyTrainingSet,

    #[error("Invalid hyperparameters: {0}")]
    InvalidHyperparameters(String),

    /// Training stopped at an epoch boundary on request
    #[error("Training cancelled after {completed_epochs} completed epochs")]
    Cancelled { completed_epochs: usize },

    /// The loss stopped being a finite number
    #[error("Training diverged at epoch {epoch}: loss is {loss}")]
    Diverged { epoch: usize, loss: f32 },

    /// A dense index beyond the embedding table was requested
    #[error("{entity} index {index} out of range for table of {len} rows")]
    IndexOutOfRange {
        entity: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Corrupt artifact: {0}")]
    CorruptArtifact(String),

    /// Artifact written by a different format version
    #[error("Unsupported artifact format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    /// The artifact's codec cannot address the current ratings
    #[error("Incompatible codec: {0}")]
    IncompatibleCodec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EmbeddingError {
    /// Whether the caller should treat this as a cold-start signal
    pub fn is_unknown_identifier(&self) -> bool {
        matches!(self, EmbeddingError::Data(e) if e.is_unknown_identifier())
    }
}

pub type Result<T> = std::result::Result<T, EmbeddingError>;
