//! Hyperparameters for the embedding model and its training loop.

use crate::error::{EmbeddingError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Nonlinearity applied after each hidden layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
}

impl Activation {
    pub(crate) fn apply(&self, z: f32) -> f32 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
        }
    }

    /// Derivative with respect to the pre-activation `z`
    pub(crate) fn derivative(&self, z: f32) -> f32 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - z.tanh().powi(2),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activation::Relu => f.write_str("relu"),
            Activation::Tanh => f.write_str("tanh"),
        }
    }
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            other => Err(format!("unknown activation '{}'", other)),
        }
    }
}

/// Model architecture and optimizer settings.
///
/// Defaults: 50-wide embeddings, hidden layers of 128 and 64 ReLU units
/// with 0.2 dropout, Adam at 0.001, batches of 64 for 5 epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
    pub embedding_dim: usize,
    pub hidden_units: [usize; 2],
    pub activation: Activation,
    pub dropout: f32,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub epochs: usize,
    /// Half-width of the uniform range embedding rows are drawn from
    pub init_scale: f32,
    pub seed: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            embedding_dim: 50,
            hidden_units: [128, 64],
            activation: Activation::Relu,
            dropout: 0.2,
            learning_rate: 0.001,
            batch_size: 64,
            epochs: 5,
            init_scale: 0.05,
            seed: 42,
        }
    }
}

impl Hyperparameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_embedding_dim(mut self, embedding_dim: usize) -> Self {
        self.embedding_dim = embedding_dim;
        self
    }

    pub fn with_hidden_units(mut self, first: usize, second: usize) -> Self {
        self.hidden_units = [first, second];
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Reject settings the training loop cannot run with
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Err(EmbeddingError::InvalidHyperparameters(reason.to_string()));

        if self.embedding_dim == 0 || self.hidden_units.contains(&0) {
            return invalid("layer widths must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning rate must be positive");
        }
        if self.batch_size == 0 {
            return invalid("batch size must be positive");
        }
        if self.epochs == 0 {
            return invalid("epochs must be positive");
        }
        if !(self.init_scale.is_finite() && self.init_scale > 0.0) {
            return invalid("init scale must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_network_shape() {
        let hyper = Hyperparameters::default();
        assert_eq!(hyper.embedding_dim, 50);
        assert_eq!(hyper.hidden_units, [128, 64]);
        assert_eq!(hyper.batch_size, 64);
        assert_eq!(hyper.epochs, 5);
        assert!(hyper.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(Hyperparameters::new().with_dropout(1.0).validate().is_err());
        assert!(Hyperparameters::new().with_batch_size(0).validate().is_err());
        assert!(Hyperparameters::new().with_epochs(0).validate().is_err());
        assert!(Hyperparameters::new().with_learning_rate(0.0).validate().is_err());
        assert!(Hyperparameters::new().with_hidden_units(8, 0).validate().is_err());
    }

    #[test]
    fn test_relu_derivative() {
        assert_eq!(Activation::Relu.apply(-2.0), 0.0);
        assert_eq!(Activation::Relu.derivative(3.0), 1.0);
        assert_eq!(Activation::Relu.derivative(-3.0), 0.0);
    }
}
