//! # Embedding Crate
//!
//! Neural rating model over learned user and movie embeddings.
//!
//! ## Main Components
//!
//! - **hyperparameters**: architecture and optimizer settings (builder style)
//! - **mlp**: the network, its forward pass and hand-written gradients
//! - **optimizer**: Adam with lazy updates for embedding rows
//! - **trainer**: `train` from scratch and `fine_tune` from a prior artifact
//! - **artifact**: weights + codec + rating bounds, versioned and checksummed
//! - **cancel**: epoch-boundary cancellation token
//!
//! ## Example Usage
//!
//! ```ignore
//! use embedding::{CancelToken, Hyperparameters, ScorePolicy, TrainedArtifact, train};
//!
//! let codec = RatingCodec::fit(&ratings);
//! let (artifact, report) = train(&ratings, &codec, &Hyperparameters::default(), &CancelToken::new())?;
//! artifact.save(Path::new("models/mlp.json"))?;
//!
//! let loaded = TrainedArtifact::load(Path::new("models/mlp.json"))?;
//! let score = loaded.predict(1, 50, ScorePolicy::ClampToBounds)?;
//! ```

pub mod artifact;
pub mod cancel;
pub mod error;
pub mod hyperparameters;
pub mod mlp;
mod optimizer;
pub mod trainer;

pub use artifact::{FORMAT_VERSION, ScorePolicy, TrainedArtifact};
pub use cancel::CancelToken;
pub use error::{EmbeddingError, Result};
pub use hyperparameters::{Activation, Hyperparameters};
pub use mlp::MlpModel;
pub use trainer::{TrainingReport, fine_tune, fine_tune_with_codec, train};
