//! Error types for the similarity crate.

use data_loader::DataLoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimilarityError {
    /// A rating referenced an identifier the codec cannot address
    #[error(transparent)]
    Data(#[from] DataLoadError),

    /// Similarity needs at least one training rating
    #[error("Cannot build a similarity model from zero ratings")]
    EmptyTrainingSet,
}

pub type Result<T> = std::result::Result<T, SimilarityError>;
