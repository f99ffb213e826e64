use data_loader::{DataLoadError, UserId};
use embedding::EmbeddingError;
use similarity::SimilarityError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Data(#[from] DataLoadError),

    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Ranking(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No trained model is loaded; train or load one first")]
    NoArtifact,

    #[error("At least {required} ratings are needed, got {got}")]
    NotEnoughRatings { got: usize, required: usize },

    #[error("The {0} must not be empty")]
    EmptyField(&'static str),

    #[error("Username '{0}' is already taken")]
    UsernameTaken(String),

    #[error("Unknown username or wrong password")]
    InvalidCredentials,

    #[error("Unknown account '{0}'")]
    UnknownAccount(String),

    #[error("No user ids left to assign after {0}")]
    UserIdsExhausted(UserId),

    #[error("Poster lookup failed: {0}")]
    Poster(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl ServiceError {
    /// Whether the failure is an identifier the current codec does not know
    pub fn is_unknown_identifier(&self) -> bool {
        match self {
            ServiceError::Data(e) => e.is_unknown_identifier(),
            ServiceError::Embedding(e) => e.is_unknown_identifier(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
